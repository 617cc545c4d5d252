//! HTML message bodies and inline keyboards.
//!
//! Callback data layout:
//! - `enroll:<title|about|tags|enroll-class|submit|cancel>&<uuid>`
//! - `approve:<title|about|tags|enroll-class|pass|fail>&<uuid>`
//! - `update:<link|title|about|tags|record-class|remove>&<uuid>`
//! - `<enroll-class|record-class>:<classification>&<uuid>`
//! - `feedback:<uuid>`, `remove:<uuid>`
//! - `blacklist:<chat|user>&<uuid>`
//! - `page:<query>&<page>`, `mine:<page>`
//!
//! Telegram caps callback data at 64 bytes.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::{
    domain::{Actor, EntityKind, Enrollment, Record},
    formatting::{escape_html, public_link, truncate_chars},
    messaging::types::{InlineButton, InlineKeyboard, ReplyKeyboard},
};

const CALLBACK_DATA_MAX: usize = 64;
const CLASSES_PER_ROW: usize = 3;
const LIST_TITLE_MAX: usize = 40;

/// Parsed inline button payload: `<scope>:<action>&<target>` or
/// `<scope>:<target>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackData<'a> {
    pub scope: &'a str,
    pub action: &'a str,
    pub target: &'a str,
}

pub fn parse_callback(data: &str) -> Option<CallbackData<'_>> {
    let (scope, rest) = data.split_once(':')?;
    let (action, target) = match rest.rsplit_once('&') {
        Some((action, target)) => (action, target),
        None => ("", rest),
    };
    Some(CallbackData {
        scope,
        action,
        target,
    })
}

struct Detail<'a> {
    kind: EntityKind,
    title: &'a str,
    username: Option<&'a str>,
    link: Option<&'a str>,
    member_count: Option<u64>,
    classification: Option<&'a str>,
    tags: Option<&'a BTreeSet<String>>,
    description: Option<&'a str>,
}

impl Detail<'_> {
    fn render(&self) -> String {
        let mut out = String::new();
        let link = self
            .link
            .map(str::to_string)
            .or_else(|| self.username.map(public_link));
        match link {
            Some(link) => out.push_str(&format!(
                "<b>{}</b>: <a href=\"{}\">{}</a>\n",
                self.kind.label(),
                escape_html(&link),
                escape_html(self.title)
            )),
            None => out.push_str(&format!(
                "<b>{}</b>: {}\n",
                self.kind.label(),
                escape_html(self.title)
            )),
        }
        if let Some(name) = self.username {
            out.push_str(&format!("<b>Username</b>: @{}\n", escape_html(name)));
        }
        if let Some(n) = self.member_count {
            out.push_str(&format!("<b>Members</b>: {n}\n"));
        }
        out.push_str(&format!(
            "<b>Classification</b>: {}\n",
            escape_html(self.classification.unwrap_or("-"))
        ));
        let tags = self
            .tags
            .filter(|t| !t.is_empty())
            .map(|t| t.iter().cloned().collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("<b>Tags</b>: {}\n", escape_html(&tags)));
        if let Some(desc) = self.description.filter(|d| !d.is_empty()) {
            out.push_str(&format!("\n{}\n", escape_html(desc)));
        }
        out
    }
}

pub fn enrollment_detail(e: &Enrollment) -> String {
    Detail {
        kind: e.kind,
        title: &e.title,
        username: e.username.as_deref(),
        link: e.link.as_deref(),
        member_count: e.member_count,
        classification: e.classification.as_deref(),
        tags: e.tags.as_ref(),
        description: e.description.as_deref(),
    }
    .render()
}

pub fn record_detail(r: &Record) -> String {
    Detail {
        kind: r.kind,
        title: &r.title,
        username: r.username.as_deref(),
        link: r.link.as_deref(),
        member_count: r.member_count,
        classification: r.classification.as_deref(),
        tags: r.tags.as_ref(),
        description: r.description.as_deref(),
    }
    .render()
}

/// Approval card shown in the moderator group.
pub fn approval_card(e: &Enrollment) -> String {
    format!(
        "{}\n<b>Submitted by</b>: {}\n",
        enrollment_detail(e),
        escape_html(&e.created_by_display_name)
    )
}

/// Moderator decision summary.
pub fn decision_card(e: &Enrollment, moderator: &Actor, passed: bool) -> String {
    format!(
        "{}\n<b>Submitted by</b>: {}\n<b>Reviewed by</b>: {}\n<b>Result</b>: {}\n",
        enrollment_detail(e),
        escape_html(&e.created_by_display_name),
        escape_html(&moderator.display_name),
        if passed { "approved" } else { "rejected" }
    )
}

/// Feedback forwarded to the moderator group.
pub fn feedback_card(record: &Record, from: &Actor, content: &str) -> String {
    format!(
        "{}\n<b>Feedback from</b>: {}\n{}\n",
        record_detail(record),
        escape_html(&from.display_name),
        escape_html(content)
    )
}

fn row(buttons: &[(&str, String)]) -> Vec<InlineButton> {
    buttons
        .iter()
        .map(|(label, data)| InlineButton::new(*label, data.clone()))
        .collect()
}

pub fn enroll_keyboard(uuid: Uuid) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        row(&[
            ("✍ Title", format!("enroll:title&{uuid}")),
            ("✍ Description", format!("enroll:about&{uuid}")),
        ]),
        row(&[
            ("✍ Tags", format!("enroll:tags&{uuid}")),
            ("✍ Classification", format!("enroll:enroll-class&{uuid}")),
        ]),
        row(&[
            ("✅ Submit", format!("enroll:submit&{uuid}")),
            ("❎ Cancel", format!("enroll:cancel&{uuid}")),
        ]),
    ])
}

pub fn approve_keyboard(uuid: Uuid) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        row(&[
            ("✍ Title", format!("approve:title&{uuid}")),
            ("✍ Description", format!("approve:about&{uuid}")),
        ]),
        row(&[
            ("✍ Tags", format!("approve:tags&{uuid}")),
            ("✍ Classification", format!("approve:enroll-class&{uuid}")),
        ]),
        row(&[
            ("✅ Pass", format!("approve:pass&{uuid}")),
            ("❎ Fail", format!("approve:fail&{uuid}")),
        ]),
    ])
}

pub fn update_keyboard(uuid: Uuid) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        row(&[("✍ Link", format!("update:link&{uuid}"))]),
        row(&[
            ("✍ Title", format!("update:title&{uuid}")),
            ("✍ Description", format!("update:about&{uuid}")),
        ]),
        row(&[
            ("✍ Tags", format!("update:tags&{uuid}")),
            ("✍ Classification", format!("update:record-class&{uuid}")),
        ]),
        row(&[("Remove", format!("update:remove&{uuid}"))]),
    ])
}

pub fn feedback_keyboard(uuid: Uuid) -> InlineKeyboard {
    InlineKeyboard::new(vec![row(&[("Feedback", format!("feedback:{uuid}"))])])
}

pub fn remove_keyboard(uuid: Uuid) -> InlineKeyboard {
    InlineKeyboard::new(vec![row(&[("Remove", format!("remove:{uuid}"))])])
}

/// Buttons under a decision card. Only approved entries can be removed.
pub fn decision_keyboard(uuid: Uuid, passed: bool) -> InlineKeyboard {
    let mut rows = Vec::new();
    if passed {
        rows.push(row(&[("Remove", format!("remove:{uuid}"))]));
    }
    rows.push(row(&[
        ("Ban chat", format!("blacklist:chat&{uuid}")),
        ("Ban submitter", format!("blacklist:user&{uuid}")),
    ]));
    InlineKeyboard::new(rows)
}

/// Classification picker; `scope` is `enroll-class` or `record-class`.
pub fn classification_keyboard(scope: &str, uuid: Uuid, classes: &[String]) -> InlineKeyboard {
    let buttons = classes
        .iter()
        .map(|c| InlineButton::new(c.clone(), format!("{scope}:{c}&{uuid}")))
        .collect();
    InlineKeyboard::grid(buttons, CLASSES_PER_ROW)
}

/// Reply keyboard offering every classification as a search shortcut.
pub fn classification_reply_keyboard(classes: &[String]) -> ReplyKeyboard {
    ReplyKeyboard {
        rows: classes
            .chunks(CLASSES_PER_ROW)
            .map(|c| c.to_vec())
            .collect(),
    }
}

/// Longest prefix of `query` that still fits a `page:<query>&<n>` payload.
pub fn callback_safe_query(query: &str) -> &str {
    // "page:" + "&" + up to 5 digits.
    let budget = CALLBACK_DATA_MAX - 11;
    if query.len() <= budget {
        return query;
    }
    let mut end = budget;
    while !query.is_char_boundary(end) {
        end -= 1;
    }
    &query[..end]
}

/// Prev / next buttons for 1-based `page` out of `pages`.
pub fn pager(page: usize, pages: usize, data: impl Fn(usize) -> String) -> Option<InlineKeyboard> {
    let mut buttons = Vec::new();
    if page > 1 {
        buttons.push(InlineButton::new("‹ Prev", data(page - 1)));
    }
    if page < pages {
        buttons.push(InlineButton::new("Next ›", data(page + 1)));
    }
    if buttons.is_empty() {
        None
    } else {
        Some(InlineKeyboard::new(vec![buttons]))
    }
}

pub fn page_count(total: u64, page_size: usize) -> usize {
    let size = page_size.max(1) as u64;
    total.div_ceil(size) as usize
}

/// One line per record, linking to the record's detail view.
pub fn record_list(records: &[Record], bot_username: &str, page: usize, pages: usize) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&format!(
            "{} <a href=\"https://t.me/{}?start={}\">{}</a>\n",
            kind_marker(r.kind),
            escape_html(bot_username),
            r.uuid,
            escape_html(&truncate_chars(&r.title, LIST_TITLE_MAX))
        ));
    }
    if pages > 1 {
        out.push_str(&format!("\nPage {page}/{pages}"));
    }
    out
}

/// The sender's records followed by their pending or rejected enrollments.
pub fn mine_list(
    records: &[Record],
    enrollments: &[Enrollment],
    bot_username: &str,
    page: usize,
    pages: usize,
) -> String {
    let mut out = record_list(records, bot_username, 1, 1);
    for e in enrollments {
        let status = match e.stage() {
            crate::domain::Stage::Drafting => "draft",
            crate::domain::Stage::Submitted => "in review",
            crate::domain::Stage::Approved => "approved",
            crate::domain::Stage::Rejected => "rejected",
        };
        out.push_str(&format!(
            "{} {} ({status})\n",
            kind_marker(e.kind),
            escape_html(&truncate_chars(&e.title, LIST_TITLE_MAX))
        ));
    }
    if pages > 1 {
        out.push_str(&format!("\nPage {page}/{pages}"));
    }
    out
}

fn kind_marker(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Channel => "📢",
        EntityKind::Group => "👥",
        EntityKind::Bot => "🤖",
        EntityKind::Person => "👤",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[test]
    fn parses_callback_shapes() {
        let id = Uuid::new_v4().to_string();
        let data = format!("approve:pass&{id}");
        let cb = parse_callback(&data).unwrap();
        assert_eq!((cb.scope, cb.action, cb.target), ("approve", "pass", id.as_str()));

        let cb = parse_callback("page:rust & go&3").unwrap();
        assert_eq!((cb.scope, cb.action, cb.target), ("page", "rust & go", "3"));

        let cb = parse_callback("mine:2").unwrap();
        assert_eq!((cb.scope, cb.action, cb.target), ("mine", "", "2"));
        assert!(parse_callback("garbage").is_none());
    }

    #[test]
    fn keyboards_fit_callback_limit() {
        let id = Uuid::new_v4();
        let classes = vec!["Technology".to_string(); 7];
        for kb in [
            enroll_keyboard(id),
            approve_keyboard(id),
            update_keyboard(id),
            classification_keyboard("record-class", id, &classes),
        ] {
            for b in kb.buttons() {
                assert!(b.callback_data.len() <= CALLBACK_DATA_MAX, "{}", b.callback_data);
            }
        }
        assert_eq!(classification_keyboard("enroll-class", id, &classes).rows.len(), 3);

        let long = "ä".repeat(60);
        let q = callback_safe_query(&long);
        assert!(format!("page:{q}&99999").len() <= CALLBACK_DATA_MAX);
    }

    #[test]
    fn pager_buttons() {
        assert!(pager(1, 1, |p| p.to_string()).is_none());
        let kb = pager(2, 3, |p| format!("page:foo&{p}")).unwrap();
        let data: Vec<_> = kb.buttons().map(|b| b.callback_data.as_str()).collect();
        assert_eq!(data, vec!["page:foo&1", "page:foo&3"]);
        assert_eq!(page_count(21, 10), 3);
        assert_eq!(page_count(0, 10), 0);
    }

    #[test]
    fn detail_escapes_and_links() {
        let mut r = record("<Rust>");
        r.username = Some("rust_lang".into());
        let html = record_detail(&r);
        assert!(html.contains("&lt;Rust&gt;"));
        assert!(html.contains("https://t.me/rust_lang"));
    }
}
