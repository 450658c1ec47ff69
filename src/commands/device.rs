//! Device management commands.

use clap::{Args, Subcommand};
use std::time::Duration;

use seedsync::models::ObjectId;
use seedsync::sync::{SyncError, SyncEvent};

use super::Session;

/// List or remove the devices of the sync group
#[derive(Args)]
pub struct DeviceCommand {
    #[command(subcommand)]
    command: DeviceSubcommand,
}

#[derive(Subcommand)]
enum DeviceSubcommand {
    /// List paired devices
    List {
        /// Fetch the latest device list from the relay first
        #[arg(long)]
        refresh: bool,
    },
    /// Remove a device from the group
    Remove {
        /// Device object ID
        id: ObjectId,
    },
}

impl DeviceCommand {
    pub async fn run(&self, session: &Session) -> Result<(), DeviceError> {
        if !session.engine.is_in_group() {
            println!("Not in a sync group.");
            println!();
            println!("Create one with 'seedsync group create' or join with 'seedsync group join <seed>'.");
            return Ok(());
        }

        match &self.command {
            DeviceSubcommand::List { refresh } => self.list(session, *refresh).await,
            DeviceSubcommand::Remove { id } => self.remove(session, id).await,
        }
    }

    async fn list(&self, session: &Session, refresh: bool) -> Result<(), DeviceError> {
        if refresh {
            let mut events = session.engine.subscribe();
            session.go_online().await?;
            // The devices fetch issued on ready answers with one applied batch.
            let wait = tokio::time::timeout(Duration::from_secs(5), async {
                while let Ok(event) = events.recv().await {
                    if matches!(event, SyncEvent::RecordsApplied { .. }) {
                        break;
                    }
                }
            });
            if wait.await.is_err() {
                eprintln!("Warning: relay did not answer, showing the local list.");
            }
        }

        let devices = session.engine.devices().await?;

        println!("Devices");
        println!("=======");
        println!();
        for device in &devices {
            let marker = if device.is_current { "* " } else { "  " };
            println!("{}{}", marker, device.name);
            println!("    ID: {}", device.object_id);
        }
        println!();
        println!("* = this device");

        Ok(())
    }

    async fn remove(&self, session: &Session, id: &ObjectId) -> Result<(), DeviceError> {
        session.go_online().await?;
        if !session.engine.remove_device(id).await? {
            println!("Device {} not found.", id);
            return Ok(());
        }

        println!("✓ Removed device {}", id);
        if !session.engine.is_in_group() {
            println!("This device left the sync group.");
        }
        Ok(())
    }
}

/// Errors from device command
#[derive(Debug)]
pub enum DeviceError {
    Sync(SyncError),
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<SyncError> for DeviceError {
    fn from(e: SyncError) -> Self {
        DeviceError::Sync(e)
    }
}
