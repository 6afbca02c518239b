use anyhow::Result;

use crate::chatlog::config::load_config;
use crate::chatlog::message::Message;
use crate::chatlog::paths::resolve_paths;
use crate::chatlog::util::truncate_with_ellipsis;
use crate::commands::CommandReport;
use crate::store::{StorageId, open_store};

const PREVIEW_CHARS: usize = 120;

fn preview(message: &Message) -> String {
    match message {
        Message::Turn(turn) => format!(
            "{}: {}",
            turn.role,
            truncate_with_ellipsis(&turn.content, PREVIEW_CHARS)
        ),
        Message::Meta(value) => format!(
            "meta: {}",
            truncate_with_ellipsis(&value.to_string(), PREVIEW_CHARS)
        ),
    }
}

pub fn run(id: &str) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let store = open_store(&paths, &cfg)?;
    let mut report = CommandReport::new("show");

    let id = StorageId::from(id.to_string());
    let Some(conversation) = store.load(&id)? else {
        report.issue(format!("conversation {id} not found in {} store", store.label()));
        return Ok(report);
    };

    report.detail(format!("storage_id={}", conversation.id));
    report.detail(format!("created_at={}", conversation.created_at_epoch_secs));
    report.detail(format!("updated_at={}", conversation.updated_at_epoch_secs));
    report.detail(format!("messages={}", conversation.messages.len()));
    for (index, message) in conversation.messages.iter().enumerate() {
        report.detail(format!("[{index}] {}", preview(message)));
    }
    report.attach(&conversation)?;
    Ok(report)
}
