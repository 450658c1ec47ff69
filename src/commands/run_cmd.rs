//! Long-running sync mode.

use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use seedsync::sync::{SyncError, SyncEvent};

use super::Session;

/// Stay connected and keep this device in sync until interrupted
#[derive(Debug, Args)]
pub struct RunCommand {}

impl RunCommand {
    pub async fn run(&self, session: &Session) -> Result<(), SyncError> {
        let engine = &session.engine;
        if !engine.is_in_group() {
            println!("Not in a sync group. Nothing to do.");
            return Ok(());
        }

        let mut events = engine.subscribe();
        engine
            .initialize_sync(None, Some(session.device_name()))
            .await?;
        println!("Syncing as '{}'. Press Ctrl-C to stop.", session.device_name());

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    println!("Stopping.");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if !report(&event) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed sync events"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        Ok(())
    }
}

/// Prints one event. Returns false once the device is no longer in a group.
fn report(event: &SyncEvent) -> bool {
    match event {
        SyncEvent::Ready => println!("✓ Connected to relay"),
        SyncEvent::RecordsApplied {
            category,
            created,
            updated,
            deleted,
        } => {
            if created + updated + deleted > 0 {
                println!(
                    "  {}: {} created, {} updated, {} deleted",
                    category, created, updated, deleted
                );
            }
        }
        SyncEvent::DeviceRemoved { object_id } => println!("  device {} removed", object_id),
        SyncEvent::CurrentDeviceRemoved => {
            println!("This device was removed from the sync group by another device.")
        }
        SyncEvent::SetupError(error) => eprintln!("✗ Relay setup error: {}", error),
        SyncEvent::PairingFailed => eprintln!("✗ Pairing with the relay timed out"),
        SyncEvent::GroupLeft => {
            println!("Left the sync group.");
            return false;
        }
    }
    true
}
