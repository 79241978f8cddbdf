//! Invitation links and invitation mail

use tracing::info;

use super::{invitation_mail, MailDispatcher};
use crate::core_identity::user::User;
use crate::core_identity::validation::validate_email;
use crate::core_space::{
    ChannelManager, InviteScope, MembershipError, MembershipManager, MembershipResult,
    WorkspaceManager,
};

/// Public URL that redeems `token`
pub fn invite_link(public_base_url: &str, scope: &InviteScope, token: &str) -> String {
    let collection = match scope {
        InviteScope::Workspace(_) => "workspaces",
        InviteScope::Channel(_) => "channels",
    };
    format!(
        "{}/api/{}/invite/{}",
        public_base_url.trim_end_matches('/'),
        collection,
        token
    )
}

/// Issues an invite and mails its link to a list of addresses
#[derive(Clone)]
pub struct InvitationSender {
    dispatcher: MailDispatcher,
    public_base_url: String,
    product_link: String,
}

impl InvitationSender {
    pub fn new(
        dispatcher: MailDispatcher,
        public_base_url: impl Into<String>,
        product_link: impl Into<String>,
    ) -> Self {
        InvitationSender {
            dispatcher,
            public_base_url: public_base_url.into(),
            product_link: product_link.into(),
        }
    }

    /// Public URL that redeems `token`
    pub fn link(&self, scope: &InviteScope, token: &str) -> String {
        invite_link(&self.public_base_url, scope, token)
    }

    /// Returns the invite link. The inviter must be an admin of the target;
    /// delivery happens in the background.
    pub fn send_invitations<M>(
        &self,
        manager: &M,
        inviter: &User,
        scope: InviteScope,
        emails: &[String],
    ) -> MembershipResult<String>
    where
        M: MembershipManager + WorkspaceManager + ChannelManager,
    {
        if emails.is_empty() {
            return Err(MembershipError::Invalid("At least one email is required".into()));
        }
        let recipients = emails
            .iter()
            .map(|email| validate_email(email))
            .collect::<Result<Vec<_>, _>>()?;

        let token = manager.issue_invite(&inviter.id, scope)?;
        let title = match &scope {
            InviteScope::Workspace(id) => manager.get_workspace(id)?.name,
            InviteScope::Channel(id) => manager.get_channel(id)?.name,
        };
        let link = self.link(&scope, &token);

        for to in &recipients {
            self.dispatcher.dispatch(invitation_mail(
                to,
                &inviter.name,
                &inviter.email,
                &title,
                scope.kind(),
                &link,
                &self.product_link,
            ));
        }
        info!(
            inviter = %inviter.id,
            scope = scope.kind(),
            recipients = recipients.len(),
            "invitations queued"
        );

        Ok(link)
    }
}
