use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use super::store::RoomStore;

/// Starts the background sweep that periodically expires rooms and
/// participants. Room sweep runs first so a room's disappearance is
/// visible before the participant pass; both stores re-check existence
/// on access, so brief cross-sweep inconsistency is tolerated.
#[instrument(skip(store))]
pub async fn start_sweep_task(store: Arc<dyn RoomStore>, sweep_interval: Duration) {
    info!(
        sweep_interval_ms = sweep_interval.as_millis() as u64,
        "Starting sweep background task"
    );

    let mut ticker = interval(sweep_interval);

    loop {
        ticker.tick().await;
        let (rooms, participants) = run_sweep(&store).await;
        if rooms > 0 || participants > 0 {
            info!(
                swept_rooms = rooms,
                swept_participants = participants,
                "Sweep pass completed"
            );
        } else {
            debug!("Sweep pass found nothing to remove");
        }
    }
}

/// One sweep pass: rooms first, then participants.
async fn run_sweep(store: &Arc<dyn RoomStore>) -> (usize, usize) {
    let rooms = store.sweep_expired_rooms().await;
    let participants = store.cleanup_participants().await;
    (rooms, participants)
}
