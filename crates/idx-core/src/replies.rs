//! User-facing reply texts, looked up by key with `{placeholder}` substitution.

use std::{collections::HashMap, path::Path};

use tracing::{info, warn};

use crate::Result;

const DEFAULTS: &[(&str, &str)] = &[
    ("start", "Welcome to the directory bot @{bot}.\nSend keywords or pick a classification below to search. Use /enroll to submit a group, channel or bot, /mine to see your submissions and /help for more."),
    ("help", "/enroll - submit a group, channel or bot\n/mine - your records and submissions\n/cancel - stop the current input\nAnything else you send is used as a search."),
    ("disable", "This command is disabled here."),
    ("only-private", "Please use this command in a private chat with @{bot}."),
    ("can-not-understand", "Sorry, I did not understand that."),
    ("error", "Sorry, your request could not be processed."),
    ("nothing-to-do", "Nothing to do, the entry no longer exists."),
    ("already-submitted", "This submission was already handed to the moderators."),
    ("already-decided", "This submission was already decided."),
    ("not-submitted", "This submission has not been handed in yet."),
    ("exist", "This chat is already listed or awaiting review."),
    ("empty", "Nothing found."),
    ("statistics", "Published records: {count}"),
    ("enroll-start", "Send me the @username or t.me link of the group, channel or bot you want to list."),
    ("enroll-not-found", "I could not find a public chat with that username."),
    ("enroll-person", "Personal accounts cannot be listed."),
    ("enroll-group-private", "The draft was sent to you in a private chat. Start @{bot} first if you did not receive it."),
    ("enroll-update-title", "Send the new title."),
    ("enroll-update-about", "Send the new description."),
    ("enroll-update-tags", "Send the tags, for example: #music #rock"),
    ("enroll-update-class", "Choose a classification:"),
    ("update-link", "Send the new @username or t.me link."),
    ("enroll-submitted", "Submitted. You will be notified once a moderator has decided."),
    ("enroll-cancelled", "The draft was discarded."),
    ("approve-pass-user", "Your submission \"{title}\" was approved and is now listed."),
    ("approve-fail-user", "Your submission \"{title}\" was not approved."),
    ("update-success", "Updated."),
    ("feedback-start", "Send your feedback about this entry."),
    ("feedback-received", "Thanks, your feedback was forwarded to the moderators."),
    ("cancel", "Input cancelled."),
    ("nothing-to-cancel", "There is nothing to cancel."),
    ("ban-parameter", "Usage: /ban@{bot} <chat id>"),
    ("ban-success", "Chat {chat-id} has been banned."),
    ("ban-no-chat-id", "This entry has no chat id to ban."),
    ("unban-parameter", "Usage: /unban@{bot} <chat id>"),
    ("unban-no-need", "Chat {chat-id} is not banned."),
    ("unban-success", "Chat {chat-id} has been unbanned."),
    ("list-parameter", "Usage: /list@{bot} <keywords>"),
    ("remove-record-manager", "{manager} removed \"{record}\"."),
    ("remove-record-user", "Your entry \"{record}\" was removed."),
    ("record-removed", "This entry has been removed from the directory."),
    ("operator-error", "Error while handling an update from {chat}:\n{error}"),
];

/// Template catalog. Built-in English defaults, optionally overridden from
/// a JSON object file mapping keys to templates.
#[derive(Clone, Debug)]
pub struct ReplyCatalog {
    templates: HashMap<String, String>,
}

impl Default for ReplyCatalog {
    fn default() -> Self {
        Self {
            templates: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ReplyCatalog {
    /// Load defaults and apply the overrides in `path`, if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::default();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)?;
            let overrides: HashMap<String, String> = serde_json::from_str(&raw)?;
            info!(path = %path.display(), count = overrides.len(), "Loaded reply overrides");
            catalog.templates.extend(overrides);
        }
        Ok(catalog)
    }

    /// Raw template for `key`. Unknown keys fall back to the key itself.
    pub fn lookup<'a>(&'a self, key: &'a str) -> &'a str {
        match self.templates.get(key) {
            Some(t) => t,
            None => {
                warn!(key, "Missing reply template");
                key
            }
        }
    }

    /// Template with every `{name}` replaced by its value.
    pub fn render(&self, key: &str, params: &[(&str, &str)]) -> String {
        let mut out = self.lookup(key).to_string();
        for (name, value) in params {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }
}
