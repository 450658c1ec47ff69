use clap::{Args, Subcommand, ValueEnum};

use seedsync::models::{Bookmark, NewBookmark, ObjectId};
use seedsync::sync::{SyncAction, SyncError};

use super::Session;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct BookmarkCommand {
    #[command(subcommand)]
    pub command: BookmarkSubcommand,
}

#[derive(Subcommand)]
pub enum BookmarkSubcommand {
    /// Add a bookmark or folder
    Add {
        /// Page title (or folder name)
        title: String,

        /// Page URL
        #[arg(long)]
        url: Option<String>,

        /// Create a folder instead of a bookmark
        #[arg(long)]
        folder: bool,

        /// Object ID of the parent folder
        #[arg(long)]
        parent: Option<ObjectId>,
    },

    /// List bookmarks
    List {
        /// Only list the children of this folder
        #[arg(long)]
        folder: Option<ObjectId>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Set the title shown for a bookmark
    Rename {
        /// Bookmark object ID
        id: ObjectId,

        /// New custom title
        title: String,
    },

    /// Remove a bookmark
    Remove {
        /// Bookmark object ID
        id: ObjectId,
    },
}

impl BookmarkCommand {
    pub async fn run(&self, session: &Session) -> Result<(), BookmarkError> {
        match &self.command {
            BookmarkSubcommand::Add {
                title,
                url,
                folder,
                parent,
            } => self.add(session, title, url.as_deref(), *folder, parent.clone()).await,
            BookmarkSubcommand::List { folder, format } => {
                self.list(session, folder.as_ref(), format).await
            }
            BookmarkSubcommand::Rename { id, title } => self.rename(session, id, title).await,
            BookmarkSubcommand::Remove { id } => self.remove(session, id).await,
        }
    }

    async fn add(
        &self,
        session: &Session,
        title: &str,
        url: Option<&str>,
        folder: bool,
        parent: Option<ObjectId>,
    ) -> Result<(), BookmarkError> {
        let repo = session.store.bookmarks();

        if let Some(parent_id) = &parent {
            match repo.get_by_object_id(parent_id).await? {
                Some(p) if p.is_folder => {}
                Some(_) => return Err(BookmarkError::NotAFolder(parent_id.clone())),
                None => return Err(BookmarkError::NotFound(parent_id.clone())),
            }
        }

        let mut new = if folder {
            NewBookmark::folder(title)
        } else {
            NewBookmark::new(title)
        };
        if let Some(url) = url {
            new = new.with_url(url);
        }
        if let Some(parent) = parent {
            new = new.with_parent(parent);
        }

        let bookmark = repo.create(&new).await?;
        println!("Added {}", bookmark);

        publish(session, SyncAction::Create, bookmark).await;
        Ok(())
    }

    async fn list(
        &self,
        session: &Session,
        folder: Option<&ObjectId>,
        format: &OutputFormat,
    ) -> Result<(), BookmarkError> {
        let repo = session.store.bookmarks();
        let bookmarks = match folder {
            Some(folder) => repo.children(folder).await?,
            None => repo.list().await?,
        };

        match format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&bookmarks)
                    .map_err(|e| BookmarkError::Output(e.to_string()))?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                if bookmarks.is_empty() {
                    println!("No bookmarks found.");
                    return Ok(());
                }
                for bookmark in &bookmarks {
                    let marker = if bookmark.is_orphaned() { " (parent pending)" } else { "" };
                    println!("{}{}", bookmark, marker);
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, session: &Session, id: &ObjectId, title: &str) -> Result<(), BookmarkError> {
        let repo = session.store.bookmarks();
        let mut bookmark = repo
            .get_by_object_id(id)
            .await?
            .ok_or_else(|| BookmarkError::NotFound(id.clone()))?;

        bookmark.custom_title = Some(title.to_string());
        let bookmark = repo.update(&bookmark).await?;
        println!("Renamed {}", bookmark);

        publish(session, SyncAction::Update, bookmark).await;
        Ok(())
    }

    async fn remove(&self, session: &Session, id: &ObjectId) -> Result<(), BookmarkError> {
        let repo = session.store.bookmarks();
        let bookmark = repo
            .get_by_object_id(id)
            .await?
            .ok_or_else(|| BookmarkError::NotFound(id.clone()))?;

        repo.delete(id).await?;
        println!("Removed {}", bookmark);

        publish(session, SyncAction::Delete, bookmark).await;
        Ok(())
    }
}

/// Pushes one local change if this device is in a group.
///
/// The local write has already happened; a relay failure is reported but
/// does not fail the command.
async fn publish(session: &Session, action: SyncAction, bookmark: Bookmark) {
    let result: Result<bool, SyncError> = async {
        if !session.go_online().await? {
            return Ok(false);
        }
        session.engine.send_records(action, &[bookmark]).await?;
        Ok(true)
    }
    .await;

    match result {
        Ok(true) => println!("Synced."),
        Ok(false) => {}
        Err(e) => eprintln!("Warning: saved locally but not synced: {}", e),
    }
}

/// Errors from bookmark commands
#[derive(Debug)]
pub enum BookmarkError {
    NotFound(ObjectId),
    NotAFolder(ObjectId),
    Database(sqlx::Error),
    Output(String),
}

impl std::fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookmarkError::NotFound(id) => write!(f, "Bookmark not found: {}", id),
            BookmarkError::NotAFolder(id) => write!(f, "Not a folder: {}", id),
            BookmarkError::Database(e) => write!(f, "Database error: {}", e),
            BookmarkError::Output(e) => write!(f, "Output error: {}", e),
        }
    }
}

impl std::error::Error for BookmarkError {}

impl From<sqlx::Error> for BookmarkError {
    fn from(e: sqlx::Error) -> Self {
        BookmarkError::Database(e)
    }
}
