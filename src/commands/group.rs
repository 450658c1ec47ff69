//! Sync group commands.

use clap::{Args, Subcommand};

use seedsync::sync::{cursor, SeedError, SyncError, SyncSeed};

use super::Session;

/// Create, join or leave a sync group
#[derive(Args)]
pub struct GroupCommand {
    #[command(subcommand)]
    pub command: GroupSubcommand,
}

#[derive(Subcommand)]
pub enum GroupSubcommand {
    /// Create a new sync group and print its seed
    Create,
    /// Join an existing group with a seed printed by another device
    Join {
        /// Base64 sync seed
        seed: String,
    },
    /// Show membership and sync status
    Show {
        /// Also print the seed so another device can join
        #[arg(long)]
        reveal_seed: bool,
    },
    /// Leave the group and forget its seed
    Leave {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl GroupCommand {
    pub async fn run(&self, session: &Session) -> Result<(), GroupError> {
        match &self.command {
            GroupSubcommand::Create => self.create(session).await,
            GroupSubcommand::Join { seed } => self.join(session, seed).await,
            GroupSubcommand::Show { reveal_seed } => self.show(session, *reveal_seed).await,
            GroupSubcommand::Leave { force } => self.leave(session, *force).await,
        }
    }

    async fn create(&self, session: &Session) -> Result<(), GroupError> {
        let engine = &session.engine;
        if !engine.initialize_new_group(session.device_name()).await? {
            println!("This device is already in a sync group.");
            println!();
            println!("Run 'seedsync group leave' first to start a new one.");
            return Ok(());
        }

        println!("Waiting for the relay to create the group...");
        engine.wait_until_ready().await?;

        let seed = engine
            .identity()
            .seed()?
            .ok_or(GroupError::Sync(SyncError::NotInGroup))?;

        println!("✓ Sync group created!");
        println!();
        println!("Group: {}", seed.fingerprint());
        println!();
        println!("To add another device, run on that device:");
        println!("  seedsync group join {}", seed.to_base64());

        Ok(())
    }

    async fn join(&self, session: &Session, encoded: &str) -> Result<(), GroupError> {
        let seed = SyncSeed::from_base64(encoded.trim())?;
        let engine = &session.engine;

        if engine.is_in_group() {
            println!("This device is already in a sync group.");
            return Ok(());
        }

        println!("Pairing with group {}...", seed.fingerprint());
        engine
            .join_group(seed.as_bytes(), session.device_name())
            .await?;

        println!("✓ Joined sync group as '{}'.", session.device_name());
        println!();
        println!("Run 'seedsync run' to keep this device in sync.");
        Ok(())
    }

    async fn show(&self, session: &Session, reveal_seed: bool) -> Result<(), GroupError> {
        let engine = &session.engine;
        let identity = engine.identity();

        let Some(seed) = identity.seed()? else {
            println!("Not in a sync group.");
            println!();
            if identity.has_ever_joined().await? {
                println!("This device was in a group before; join again with a seed.");
            } else {
                println!("Create one with: seedsync group create");
            }
            return Ok(());
        };

        let device_name = identity
            .device_name()
            .await?
            .unwrap_or_else(|| session.device_name().to_string());
        let last_sync = cursor::load(&session.store.preferences()).await?;

        println!("Sync Group");
        println!("==========");
        println!();
        println!("Group:     {}", seed.fingerprint());
        println!("Device:    {}", device_name);
        match identity.device_id().await? {
            Some(id) => println!("Device ID: {}", id),
            None => println!("Device ID: (not assigned yet)"),
        }
        println!("Devices:   {}", engine.devices().await?.len());
        if last_sync == 0 {
            println!("Bookmarks: never synced");
        } else {
            println!("Bookmarks: synced up to {}", last_sync);
        }

        if reveal_seed {
            println!();
            println!("Seed: {}", seed.to_base64());
            println!("Keep this secret; anyone holding it can join the group.");
        }

        Ok(())
    }

    async fn leave(&self, session: &Session, force: bool) -> Result<(), GroupError> {
        let engine = &session.engine;
        if !engine.is_in_group() {
            println!("Not in a sync group.");
            return Ok(());
        }

        if !force {
            println!("Leaving removes the seed and all device records from this device.");
            println!("Local bookmarks are kept.");
            println!();
            println!("Run again with --force to confirm.");
            return Ok(());
        }

        engine.leave_group().await?;
        println!("✓ Left the sync group.");
        Ok(())
    }
}

/// Errors from group commands
#[derive(Debug)]
pub enum GroupError {
    InvalidSeed(SeedError),
    Sync(SyncError),
    Database(sqlx::Error),
}

impl std::fmt::Display for GroupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupError::InvalidSeed(e) => write!(f, "Invalid seed: {}", e),
            GroupError::Sync(e) => write!(f, "{}", e),
            GroupError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for GroupError {}

impl From<SeedError> for GroupError {
    fn from(e: SeedError) -> Self {
        GroupError::InvalidSeed(e)
    }
}

impl From<SyncError> for GroupError {
    fn from(e: SyncError) -> Self {
        GroupError::Sync(e)
    }
}

impl From<sqlx::Error> for GroupError {
    fn from(e: sqlx::Error) -> Self {
        GroupError::Database(e)
    }
}
