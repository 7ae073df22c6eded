//! Item commands - Look up file system items and browse folders

use anyhow::{Context, Result};
use clap::Args;
use rootsync_core::domain::{FileSystemItem, FileSystemItemId, Principal};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct ItemCommand {
    /// File system item id, e.g. `defaultFileSystemItemFactory#default#<doc id>`
    pub item_id: FileSystemItemId,
    /// Principal the item is resolved for
    #[arg(long, short)]
    pub principal: Principal,
}

impl ItemCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        if !session.service.can_handle_id(&self.item_id) {
            format.error(&format!("No adapter handles item id {}", self.item_id));
            return Ok(());
        }
        let item = session
            .service
            .get_file_system_item_by_id(&self.item_id, &self.principal)
            .await
            .context("Failed to look up item")?;

        match item {
            Some(item) if format.is_json() => {
                let json = serde_json::to_value(&item).context("Failed to serialize item")?;
                format.print_json(&json);
            }
            Some(item) => print_item(format, &item),
            None => format.error(&format!(
                "Item {} not found or not visible to {}",
                self.item_id, self.principal
            )),
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ChildrenCommand {
    /// Folder item id; the top-level folder when omitted
    pub item_id: Option<FileSystemItemId>,
    /// Principal the children are listed for
    #[arg(long, short)]
    pub principal: Principal,
}

impl ChildrenCommand {
    pub async fn execute(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let folder_id = match &self.item_id {
            Some(id) => id.clone(),
            None => session.service.top_level_folder().id,
        };
        let children = session
            .service
            .list_children(&folder_id, &self.principal)
            .await
            .context("Failed to list children")?;

        if format.is_json() {
            let json = serde_json::to_value(&children).context("Failed to serialize items")?;
            format.print_json(&json);
            return Ok(());
        }

        format.success(&format!("{} ({} item(s))", folder_id, children.len()));
        for child in &children {
            let marker = if child.is_folder() { "/" } else { "" };
            format.info(&format!("{}{}  {}", child.name, marker, child.id));
        }
        Ok(())
    }
}

fn print_item(format: OutputFormat, item: &FileSystemItem) {
    format.success(&item.name);
    format.field("Id", item.id.as_str());
    format.field(
        "Parent",
        item.parent_id.as_ref().map_or("none", |p| p.as_str()),
    );
    format.field("Kind", if item.is_folder() { "folder" } else { "file" });
    if let Some(length) = item.length {
        format.field("Length", &length.to_string());
    }
    if let Some(digest) = &item.digest {
        format.field("Digest", digest);
    }
    format.field("Modified", &item.modified.to_rfc3339());
    if let Some(lock) = &item.lock {
        format.field("Locked by", lock.owner.as_str());
    }
    format.field(
        "Permissions",
        &format!(
            "rename={} delete={} update={} create_child={}",
            item.can_rename, item.can_delete, item.can_update, item.can_create_child
        ),
    );
}
