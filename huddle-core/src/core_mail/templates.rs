//! Mail bodies

use super::OutgoingMail;

/// Invitation to a workspace or channel
pub fn invitation_mail(
    to: &str,
    inviter_name: &str,
    inviter_email: &str,
    title: &str,
    kind: &str,
    link: &str,
    product_link: &str,
) -> OutgoingMail {
    let html = format!(
        r#"<h3>You've been invited to {title} {kind}</h3>
<p><strong>{inviter}</strong> ({email}) has invited you to join the {kind} <strong>{title}</strong>.</p>
<p>Joining link: <a href="{link}">Click here to join</a></p>
<h4>What is Huddle?</h4>
<p>Huddle is a messaging app for teams, a place to collaborate on projects and keep conversations organized.</p>
<a href="{product}">Learn more about Huddle</a>"#,
        title = escape(title),
        kind = kind,
        inviter = escape(inviter_name),
        email = escape(inviter_email),
        link = link,
        product = product_link,
    );

    OutgoingMail {
        to: to.to_string(),
        subject: format!("Invitation to {} {}", title, kind),
        html,
    }
}

/// Password reset link
pub fn reset_mail(to: &str, username: &str, link: &str) -> OutgoingMail {
    let html = format!(
        r#"<h3>Reset your password</h3>
<p>Hi {name},</p>
<p>Someone asked to reset the password of your Huddle account. The link below is valid for a short time.</p>
<p><a href="{link}">Reset password</a></p>
<p>If you did not ask for this, you can ignore this mail.</p>"#,
        name = escape(username),
        link = link,
    );

    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your Huddle password".to_string(),
        html,
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_mail() {
        let mail = invitation_mail(
            "bob@example.com",
            "Alice",
            "alice@example.com",
            "Acme",
            "workspace",
            "http://localhost:5000/api/workspaces/invite/tok",
            "https://huddle.example",
        );
        assert_eq!(mail.to, "bob@example.com");
        assert_eq!(mail.subject, "Invitation to Acme workspace");
        assert!(mail.html.contains(r#"href="http://localhost:5000/api/workspaces/invite/tok""#));
        assert!(mail.html.contains("alice@example.com"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mail = invitation_mail("b@x.io", "<script>", "a@x.io", "A&B", "channel", "l", "p");
        assert!(mail.html.contains("&lt;script&gt;"));
        assert!(mail.html.contains("A&amp;B"));
        assert!(!mail.html.contains("<script>"));
    }

    #[test]
    fn test_reset_mail() {
        let mail = reset_mail("a@x.io", "Ann", "http://h/api/users/reset-password/t");
        assert!(mail.html.contains("Hi Ann"));
        assert!(mail.html.contains("reset-password/t"));
    }
}
