use clap::{Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use soapstone_api::{ApiContext, BookmarkFolderParams};
use soapstone_entities::{Entity, EntityListQuery, GroupRole};

#[derive(Subcommand)]
pub enum BookmarkFolderCommand {
    /// List folders
    List {
        /// Follow pagination until the last page
        #[arg(long)]
        all: bool,
    },

    /// Create a folder
    Create {
        name: String,

        #[arg(long)]
        emoji: Option<String>,
    },

    /// Rename a folder
    Rename {
        id: String,
        name: String,

        #[arg(long)]
        emoji: Option<String>,
    },

    /// Delete a folder
    Delete { id: String },
}

impl BookmarkFolderCommand {
    pub async fn run(self, context: &ApiContext) -> Result<()> {
        match self {
            BookmarkFolderCommand::List { all } => {
                let folders = context.bookmark_folders().into_diagnostic()?;
                print_json(&fetch_list(&folders, all).await?)
            }
            BookmarkFolderCommand::Create { name, emoji } => {
                let body = folder_params(name, emoji).to_body().into_diagnostic()?;
                let folder = context
                    .create_bookmark_folder()
                    .into_diagnostic()?
                    .create(Some(body))
                    .await
                    .into_diagnostic()?;
                print_json(&folder)
            }
            BookmarkFolderCommand::Rename { id, name, emoji } => {
                let body = folder_params(name, emoji).to_body().into_diagnostic()?;
                let folder = context
                    .update_bookmark_folder()
                    .into_diagnostic()?
                    .update(&id, body)
                    .await
                    .into_diagnostic()?;
                print_json(&folder)
            }
            BookmarkFolderCommand::Delete { id } => {
                context
                    .delete_bookmark_folder()
                    .into_diagnostic()?
                    .delete(&id)
                    .await
                    .into_diagnostic()?;
                info!(id = %id, "bookmark folder deleted");
                Ok(())
            }
        }
    }
}

fn folder_params(name: String, emoji: Option<String>) -> BookmarkFolderParams {
    let params = BookmarkFolderParams::new(name);
    match emoji {
        Some(emoji) => params.emoji(emoji),
        None => params,
    }
}

/// Member roles accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Owner,
    Admin,
    User,
}

impl From<RoleArg> for GroupRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Owner => GroupRole::Owner,
            RoleArg::Admin => GroupRole::Admin,
            RoleArg::User => GroupRole::User,
        }
    }
}

#[derive(Subcommand)]
pub enum GroupCommand {
    /// List the groups of the current account
    List {
        #[arg(long)]
        all: bool,
    },

    /// Show a group and the current account's relationship to it
    Show { id: String },

    /// Join a group
    Join { id: String },

    /// Leave a group
    Leave { id: String },

    /// List members of a group
    Members {
        id: String,

        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,

        #[arg(long)]
        all: bool,
    },

    /// Remove a member from a group
    Kick { group_id: String, member_id: String },

    /// Block a member from a group
    Block { group_id: String, member_id: String },

    /// Make an account an admin of a group
    Promote { group_id: String, account_id: String },

    /// Make an account a plain member of a group
    Demote { group_id: String, account_id: String },
}

impl GroupCommand {
    pub async fn run(self, context: &ApiContext) -> Result<()> {
        match self {
            GroupCommand::List { all } => {
                let groups = context.groups().into_diagnostic()?;
                print_json(&fetch_list(&groups, all).await?)
            }
            GroupCommand::Show { id } => {
                let view = context.load_group(&id).await.into_diagnostic()?;
                print_json(&json!({
                    "group": view.group,
                    "relationship": view.relationship,
                }))
            }
            GroupCommand::Join { id } => {
                let action = context.join_group(&id).into_diagnostic()?;
                print_json(&action.run().await.into_diagnostic()?)
            }
            GroupCommand::Leave { id } => {
                let action = context.leave_group(&id).into_diagnostic()?;
                print_json(&action.run().await.into_diagnostic()?)
            }
            GroupCommand::Members { id, role, all } => {
                let members = context.group_members(&id, role.into()).into_diagnostic()?;
                print_json(&fetch_list(&members, all).await?)
            }
            GroupCommand::Kick {
                group_id,
                member_id,
            } => {
                context
                    .kick_group_member(&group_id)
                    .into_diagnostic()?
                    .dismiss(&member_id)
                    .await
                    .into_diagnostic()?;
                info!(group_id = %group_id, member_id = %member_id, "member kicked");
                Ok(())
            }
            GroupCommand::Block {
                group_id,
                member_id,
            } => {
                context
                    .block_group_member(&group_id)
                    .into_diagnostic()?
                    .run(&member_id)
                    .await
                    .into_diagnostic()?;
                info!(group_id = %group_id, member_id = %member_id, "member blocked");
                Ok(())
            }
            GroupCommand::Promote {
                group_id,
                account_id,
            } => {
                let change = context.promote_group_member(&group_id).into_diagnostic()?;
                print_json(&change.run(&account_id).await.into_diagnostic()?)
            }
            GroupCommand::Demote {
                group_id,
                account_id,
            } => {
                let change = context.demote_group_member(&group_id).into_diagnostic()?;
                print_json(&change.run(&account_id).await.into_diagnostic()?)
            }
        }
    }
}

#[derive(Subcommand)]
pub enum StatusCommand {
    /// Show a status
    Show { id: String },

    /// Delete a status
    Delete { id: String },
}

impl StatusCommand {
    pub async fn run(self, context: &ApiContext) -> Result<()> {
        match self {
            StatusCommand::Show { id } => {
                let status = context
                    .status(&id)
                    .into_diagnostic()?
                    .load()
                    .await
                    .into_diagnostic()?;
                print_json(&status)
            }
            StatusCommand::Delete { id } => {
                context
                    .delete_status()
                    .into_diagnostic()?
                    .delete(&id)
                    .await
                    .into_diagnostic()?;
                info!(id = %id, "status deleted");
                Ok(())
            }
        }
    }
}

async fn fetch_list<T: Entity + Serialize>(query: &EntityListQuery<T>, all: bool) -> Result<Vec<T>> {
    query.fetch().await.into_diagnostic()?;
    while all && query.has_more() {
        query.fetch_next_page().await.into_diagnostic()?;
    }
    Ok(query.entities())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
