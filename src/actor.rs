/* Per-device actor: owns the transport and the update sequencer of one keyboard and runs its
 * lighting updates strictly one at a time, in submission order. */
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::driver::sequencer::{UpdateReport, UpdateRequest, UpdateSequencer};
use crate::driver::{DeviceIo, Transport};
use crate::error::LightingError;
use crate::keyboard_database::KeyboardModel;

/* Updates a device may have queued before `submit` starts refusing more. */
pub const QUEUE_SIZE: usize = 32;

type Reply = oneshot::Sender<Result<UpdateReport, LightingError>>;

enum ActorMessage {
    Apply {
        request: UpdateRequest,
        /* `None` for fire-and-forget submissions. */
        reply: Option<Reply>,
    },
    Shutdown,
}

/// Cloneable handle to a running device actor.
///
/// Every clone feeds the same queue, so updates from different callers never
/// interleave on the wire.
#[derive(Clone)]
pub struct ActorHandle {
    tx: mpsc::Sender<ActorMessage>,
    name: String,
}

impl ActorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /* Queue an update without waiting for it. Failures are only logged. */
    /*                                                                     */
    /* Never blocks: a full queue refuses the update instead.              */
    pub fn submit(&self, request: UpdateRequest) -> Result<(), LightingError> {
        self.tx
            .try_send(ActorMessage::Apply {
                request,
                reply: None,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => LightingError::QueueFull(self.name.clone()),
                TrySendError::Closed(_) => LightingError::ActorStopped(self.name.clone()),
            })
    }

    /* Queue an update and wait for its outcome. */
    pub async fn apply(&self, request: UpdateRequest) -> Result<UpdateReport, LightingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::Apply {
                request,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| LightingError::ActorStopped(self.name.clone()))?;

        reply_rx
            .await
            .map_err(|_| LightingError::ActorStopped(self.name.clone()))?
    }

    /* Stop the actor once the updates queued before this call are done. */
    pub async fn shutdown(&self) {
        if self.tx.send(ActorMessage::Shutdown).await.is_err() {
            debug!("Actor for {} already stopped", self.name);
        }
    }
}

/* Open the hidraw node and start an actor driving it with `model`. */
pub async fn spawn_device_actor(devnode: &Path, model: Arc<KeyboardModel>) -> Result<ActorHandle> {
    let io = DeviceIo::open(devnode).await?;
    info!("Opened {} as {}", devnode.display(), model.name);
    Ok(spawn_with_transport(Box::new(io), model))
}

/* Start an actor over an already opened transport. */
pub fn spawn_with_transport(
    transport: Box<dyn Transport>,
    model: Arc<KeyboardModel>,
) -> ActorHandle {
    let name = transport.name().to_string();
    let span = info_span!("device", node = %name);
    let sequencer = UpdateSequencer::new(model, span.clone());
    let (tx, rx) = mpsc::channel(QUEUE_SIZE);

    tokio::spawn(run(transport, sequencer, rx).instrument(span));

    ActorHandle { tx, name }
}

async fn run(
    mut transport: Box<dyn Transport>,
    mut sequencer: UpdateSequencer,
    mut rx: mpsc::Receiver<ActorMessage>,
) {
    debug!("Device actor started for {}", sequencer.model().name);

    while let Some(msg) = rx.recv().await {
        match msg {
            ActorMessage::Apply { request, reply } => {
                let result = sequencer.apply(transport.as_mut(), request).await;
                match reply {
                    Some(reply) => {
                        /* The caller may have given up waiting. */
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Submitted lighting update failed: {e}");
                        }
                    }
                }
            }
            ActorMessage::Shutdown => break,
        }
    }

    info!("Device actor for {} stopped", transport.name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Color, KeyMode, KeyState};
    use crate::driver::mock::RecordingTransport;
    use crate::keyboard_database::{Region, RegionKind};

    fn model() -> Arc<KeyboardModel> {
        Arc::new(KeyboardModel {
            name: "Test Board".to_string(),
            package_size: 0x9B,
            regions: vec![
                Region { kind: RegionKind::Modifiers, id: 0x2D, keycodes: vec![0xE0] },
                Region { kind: RegionKind::Alphanumerics, id: 0x08, keycodes: vec![0x04] },
                Region { kind: RegionKind::Enter, id: 0x87, keycodes: vec![] },
                Region { kind: RegionKind::Special, id: 0x44, keycodes: vec![] },
            ],
        })
    }

    fn snapshot(red: u8) -> Vec<KeyState> {
        let model = model();
        let keys = model
            .regions
            .iter()
            .flat_map(|r| r.slots().map(move |kc| (r.id, kc)))
            .map(|(region, keycode)| {
                let mut key = KeyState::new(region, keycode, KeyMode::Steady);
                key.main_color = Color::from_bytes(red, 0, 0);
                key
            })
            .collect();
        keys
    }

    #[tokio::test]
    async fn updates_run_in_submission_order() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let handle = spawn_with_transport(Box::new(transport), model());

        handle.submit(UpdateRequest { keys: snapshot(0x10), force: false }).unwrap();
        let mut second = snapshot(0x10);
        second[3].main_color = Color::from_bytes(0x20, 0, 0);
        handle.submit(UpdateRequest { keys: second, force: false }).unwrap();
        let report = handle
            .apply(UpdateRequest { keys: snapshot(0x30), force: true })
            .await
            .unwrap();
        assert_eq!(report.regions_sent.len(), 4);

        let sent = log.lock().unwrap().clone();
        /* 4 regions + commit, alphanumerics + commit, 4 regions + commit */
        assert_eq!(sent.len(), 12);
        assert_eq!(sent[0].bytes[4], 0x10);
        assert_eq!(&sent[5].bytes[..3], &[0x0E, 0x00, 0x08]);
        /* region slot (14 bytes), then key 0x04's two byte header */
        assert_eq!(sent[5].bytes[14 + 2], 0x20);
        assert_eq!(sent[7].bytes[4], 0x30);
        assert_eq!(sent[11].bytes[0], 0x0D);
    }

    #[tokio::test]
    async fn apply_reports_sequencer_errors() {
        let handle = spawn_with_transport(Box::new(RecordingTransport::new()), model());

        let err = handle
            .apply(UpdateRequest { keys: Vec::new(), force: false })
            .await
            .unwrap_err();

        assert!(matches!(err, LightingError::InputMismatch { expected: 6, actual: 0, .. }));
    }

    #[tokio::test]
    async fn failed_submission_does_not_stop_the_actor() {
        let handle = spawn_with_transport(Box::new(RecordingTransport::failing_at(0)), model());

        handle.submit(UpdateRequest { keys: snapshot(1), force: false }).unwrap();
        let report = handle
            .apply(UpdateRequest { keys: snapshot(1), force: false })
            .await
            .unwrap();

        /* the failed run forgot its snapshot, so everything goes out again */
        assert_eq!(report.regions_sent.len(), 4);
    }

    #[tokio::test]
    async fn full_queue_refuses_submissions() {
        let handle = spawn_with_transport(Box::new(RecordingTransport::new()), model());

        /* the actor task has not run yet on this single threaded runtime */
        for _ in 0..QUEUE_SIZE {
            handle.submit(UpdateRequest { keys: snapshot(1), force: true }).unwrap();
        }
        let err = handle
            .submit(UpdateRequest { keys: snapshot(1), force: true })
            .unwrap_err();
        assert!(matches!(err, LightingError::QueueFull(name) if name == "mock"));

        /* waiting callers still get through once the queue drains */
        let report = handle
            .apply(UpdateRequest { keys: snapshot(2), force: false })
            .await
            .unwrap();
        assert_eq!(report.regions_sent.len(), 4);
    }

    #[tokio::test]
    async fn stopped_actor_refuses_updates() {
        let handle = spawn_with_transport(Box::new(RecordingTransport::new()), model());
        let clone = handle.clone();

        handle.shutdown().await;
        let err = clone
            .apply(UpdateRequest { keys: snapshot(1), force: false })
            .await
            .unwrap_err();

        assert!(matches!(err, LightingError::ActorStopped(name) if name == "mock"));
    }
}
