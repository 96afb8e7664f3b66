/* Update sequencer: validates a key snapshot against its keyboard model, schedules the effects,
 * encodes effect, region and commit packets and sends them in order, stopping at the first
 * transport failure. */
use std::sync::Arc;

use tracing::{debug, error, info, warn, Instrument, Span};

use super::commit_packet::{commit_status, encode_commit_packet};
use super::effect_packet::encode_effect_packet;
use super::key_packet::encode_region_packet;
use super::schedule::schedule_effects;
use super::Transport;
use crate::device::KeyState;
use crate::error::{LightingError, Stage};
use crate::keyboard_database::KeyboardModel;

/* One lighting update: a full snapshot of every key of the model. */
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub keys: Vec<KeyState>,
    /* Re-send every region even when nothing in it changed. */
    pub force: bool,
}

/* What a completed update put on the wire. */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub effects_sent: usize,
    /* Region ids in send order. */
    pub regions_sent: Vec<u8>,
    /* `None` when the update was a no-op and no commit was written. */
    pub commit_status: Option<u8>,
}

impl UpdateReport {
    pub fn is_noop(&self) -> bool {
        self.commit_status.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Feature,
    Write,
}

/* A fully encoded packet waiting to be sent. */
struct Step {
    stage: Stage,
    channel: Channel,
    bytes: Vec<u8>,
}

/* Keys compare by data, which ignores the scheduled effect slot. */
fn same_key(a: &KeyState, b: &KeyState) -> bool {
    a == b && a.effect_id() == b.effect_id()
}

/// Drives lighting updates for one keyboard.
///
/// Each update moves through a fixed sequence: validate, schedule effects,
/// encode effects, encode the modifiers, alphanumerics, enter and special
/// regions, then commit. Every packet is encoded before the first byte is
/// sent, so input errors never leave the device half-updated.
///
/// Unless the request is forced, regions without any key in the snapshot
/// are skipped, and so are regions whose keys are unchanged since the last
/// snapshot applied successfully.
pub struct UpdateSequencer {
    model: Arc<KeyboardModel>,
    span: Span,
    last_applied: Option<Vec<KeyState>>,
}

impl UpdateSequencer {
    pub fn new(model: Arc<KeyboardModel>, span: Span) -> Self {
        Self {
            model,
            span,
            last_applied: None,
        }
    }

    pub fn model(&self) -> &KeyboardModel {
        &self.model
    }

    /// Apply `request` through `transport`.
    ///
    /// On a transport failure the remaining packets are dropped, the error
    /// names the failing stage and the remembered snapshot is discarded so
    /// the next update re-sends every region.
    pub async fn apply(
        &mut self,
        transport: &mut dyn Transport,
        request: UpdateRequest,
    ) -> Result<UpdateReport, LightingError> {
        let span = self.span.clone();
        self.run(transport, request).instrument(span).await
    }

    async fn run(
        &mut self,
        transport: &mut dyn Transport,
        request: UpdateRequest,
    ) -> Result<UpdateReport, LightingError> {
        let UpdateRequest { mut keys, force } = request;

        /* Validate */
        let expected = self.model.key_count();
        if keys.len() != expected {
            return Err(LightingError::InputMismatch {
                model: self.model.name.clone(),
                expected,
                actual: keys.len(),
            });
        }
        for key in keys
            .iter()
            .filter(|k| !self.model.has_slot(k.region, k.keycode))
        {
            warn!(
                "Key {:#04x}/{:#04x} matches no slot of {}, ignoring it",
                key.region, key.keycode, self.model.name
            );
        }

        /* ScheduleEffects */
        let effects = schedule_effects(&mut keys)?;

        /* EncodeEffects */
        let package_size = self.model.package_size;
        let mut steps = Vec::new();
        for effect in &effects {
            steps.push(Step {
                stage: Stage::Effect { id: effect.id },
                channel: Channel::Feature,
                bytes: encode_effect_packet(effect, package_size)?,
            });
        }

        /* EncodeRegion, in model order */
        let mut regions_sent = Vec::new();
        for region in &self.model.regions {
            if !force && !keys.iter().any(|k| k.region == region.id) {
                debug!("Region {} has no keys, skipping", region.kind);
                continue;
            }
            if !force && !self.region_changed(region.id, &keys) {
                debug!("Region {} unchanged, skipping", region.kind);
                continue;
            }
            steps.push(Step {
                stage: Stage::Region { id: region.id },
                channel: Channel::Feature,
                bytes: encode_region_packet(&keys, region, package_size)?,
            });
            regions_sent.push(region.id);
        }

        if regions_sent.is_empty() {
            debug!("Snapshot unchanged, nothing to send");
            return Ok(UpdateReport::default());
        }

        /* Commit */
        let status = commit_status(&regions_sent);
        steps.push(Step {
            stage: Stage::Commit { status },
            channel: Channel::Write,
            bytes: encode_commit_packet(status).to_vec(),
        });

        for step in &steps {
            debug!("Sending {} ({} bytes)", step.stage, step.bytes.len());
            let sent = match step.channel {
                Channel::Feature => transport.send_feature_report(&step.bytes).await,
                Channel::Write => transport.write(&step.bytes).await,
            };
            if let Err(source) = sent {
                error!(
                    "Lighting update on {} aborted at {}: {}",
                    transport.name(),
                    step.stage,
                    source
                );
                self.last_applied = None;
                return Err(LightingError::Transport {
                    stage: step.stage,
                    source,
                });
            }
        }

        let report = UpdateReport {
            effects_sent: effects.len(),
            regions_sent,
            commit_status: Some(status),
        };
        info!(
            "Lighting update applied: {} effects, regions {:02x?}, status {:#04x}",
            report.effects_sent, report.regions_sent, status
        );

        self.last_applied = Some(keys);
        Ok(report)
    }

    fn region_changed(&self, region: u8, keys: &[KeyState]) -> bool {
        let Some(last) = &self.last_applied else {
            return true;
        };
        let current: Vec<&KeyState> = keys.iter().filter(|k| k.region == region).collect();
        let previous: Vec<&KeyState> = last.iter().filter(|k| k.region == region).collect();

        current.len() != previous.len()
            || current
                .iter()
                .zip(&previous)
                .any(|(a, b)| !same_key(a, b))
    }
}
