//! Multi-angle synchronization.
//!
//! The vehicle records several cameras at once. A navigation event on the
//! visible angle is mapped to a time, each other angle picks the frame shown at
//! that time, and every angle renders it. The primary angle is driven on the
//! caller's task; the others run as independent tasks so a slow angle never
//! holds up the one the user is looking at.

use crate::engine::{FrameEngine, FrameOutcome};
use crate::error::{EngineError, SyncError};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::task::JoinHandle;

/// A camera position on the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CameraAngle {
    Front,
    Back,
    LeftRepeater,
    RightRepeater,
    LeftPillar,
    RightPillar,
}

impl CameraAngle {
    pub const ALL: [CameraAngle; 6] = [
        Self::Front,
        Self::Back,
        Self::LeftRepeater,
        Self::RightRepeater,
        Self::LeftPillar,
        Self::RightPillar,
    ];

    /// Name used in recording file names (`2024-05-01_10-00-00-front.mp4`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::LeftRepeater => "left_repeater",
            Self::RightRepeater => "right_repeater",
            Self::LeftPillar => "left_pillar",
            Self::RightPillar => "right_pillar",
        }
    }
}

impl fmt::Display for CameraAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraAngle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|angle| angle.as_str() == normalized)
            .ok_or_else(|| format!("unknown camera angle: {s}"))
    }
}

/// Result of a synchronized navigation.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Outcome on the primary angle.
    pub primary: FrameOutcome,
    followers: Vec<(CameraAngle, JoinHandle<Result<FrameOutcome, EngineError>>)>,
}

impl SyncOutcome {
    /// Angles still rendering in the background.
    pub fn follower_angles(&self) -> Vec<CameraAngle> {
        self.followers.iter().map(|(angle, _)| *angle).collect()
    }

    /// Wait for every follower angle.
    pub async fn join_followers(self) -> Vec<(CameraAngle, Result<FrameOutcome, SyncError>)> {
        let (angles, handles): (Vec<_>, Vec<_>) = self.followers.into_iter().unzip();
        angles
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(angle, joined)| {
                let result = match joined {
                    Ok(outcome) => outcome.map_err(SyncError::from),
                    Err(e) => Err(SyncError::Join {
                        angle,
                        reason: e.to_string(),
                    }),
                };
                (angle, result)
            })
            .collect()
    }
}

/// Drives one [`FrameEngine`] per camera angle in lockstep.
#[derive(Default)]
pub struct SyncCoordinator {
    engines: BTreeMap<CameraAngle, FrameEngine>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an engine, returning the one it replaces.
    pub fn attach(&mut self, angle: CameraAngle, engine: FrameEngine) -> Option<FrameEngine> {
        tracing::debug!(%angle, frames = engine.timeline().len(), "Attached camera angle");
        self.engines.insert(angle, engine)
    }

    /// Detach and dispose an angle's engine.
    pub fn detach(&mut self, angle: CameraAngle) -> bool {
        match self.engines.remove(&angle) {
            Some(engine) => {
                engine.dispose();
                tracing::debug!(%angle, "Detached camera angle");
                true
            }
            None => false,
        }
    }

    pub fn engine(&self, angle: CameraAngle) -> Option<&FrameEngine> {
        self.engines.get(&angle)
    }

    pub fn angles(&self) -> Vec<CameraAngle> {
        self.engines.keys().copied().collect()
    }

    /// Frame each angle shows at `time_ms`. Angles with no frames are left out.
    pub fn plan(&self, time_ms: f64) -> BTreeMap<CameraAngle, usize> {
        self.engines
            .iter()
            .filter(|(_, engine)| !engine.timeline().is_empty())
            .map(|(angle, engine)| (*angle, engine.frame_index_at_time(time_ms)))
            .collect()
    }

    /// Show the frame at `time_ms` on every angle.
    pub async fn seek_to_time(
        &self,
        primary: CameraAngle,
        time_ms: f64,
    ) -> Result<SyncOutcome, SyncError> {
        let engine = self.primary(primary)?;
        let index = engine.frame_index_at_time(time_ms);
        self.drive(primary, index, time_ms).await
    }

    /// Show frame `index` of the primary angle and the matching frame elsewhere.
    pub async fn seek_to_frame(
        &self,
        primary: CameraAngle,
        index: usize,
    ) -> Result<SyncOutcome, SyncError> {
        let engine = self.primary(primary)?;
        let frame = engine.frame(index).ok_or(EngineError::FrameOutOfRange {
            index,
            len: engine.timeline().len(),
        })?;
        self.drive(primary, index, frame.timestamp_ms).await
    }

    /// Step the primary angle by `delta` frames, clamped to the timeline.
    pub async fn step(&self, primary: CameraAngle, delta: i64) -> Result<SyncOutcome, SyncError> {
        let engine = self.primary(primary)?;
        let len = engine.timeline().len();
        if len == 0 {
            return Err(EngineError::FrameOutOfRange { index: 0, len }.into());
        }
        let current = engine.current_index() as i64;
        let target = (current + delta).clamp(0, len as i64 - 1) as usize;
        self.seek_to_frame(primary, target).await
    }

    /// Move every angle by `delta_ms` from the primary angle's current frame.
    pub async fn jump(&self, primary: CameraAngle, delta_ms: f64) -> Result<SyncOutcome, SyncError> {
        let engine = self.primary(primary)?;
        let now = engine
            .frame(engine.current_index())
            .map(|frame| frame.timestamp_ms)
            .unwrap_or(0.0);
        self.seek_to_time(primary, (now + delta_ms).max(0.0)).await
    }

    fn primary(&self, angle: CameraAngle) -> Result<&FrameEngine, SyncError> {
        self.engines
            .get(&angle)
            .ok_or(SyncError::UnknownAngle(angle))
    }

    async fn drive(
        &self,
        primary: CameraAngle,
        index: usize,
        time_ms: f64,
    ) -> Result<SyncOutcome, SyncError> {
        let engine = self.primary(primary)?;

        // Followers start before the primary so they overlap its decode
        let followers = self
            .engines
            .iter()
            .filter(|(angle, engine)| **angle != primary && !engine.timeline().is_empty())
            .map(|(angle, engine)| {
                let engine = engine.clone();
                let follower_index = engine.frame_index_at_time(time_ms);
                let handle = tokio::spawn(async move { engine.show_frame(follower_index).await });
                (*angle, handle)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            %primary,
            index,
            time_ms,
            followers = followers.len(),
            "Synchronized navigation"
        );

        let outcome = engine.show_frame(index).await?;
        Ok(SyncOutcome {
            primary: outcome,
            followers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::testing::{RecordingSink, ReferenceDecoder};
    use assert_matches::assert_matches;
    use dashframe_media::fixture::DashcamFileBuilder;
    use dashframe_media::{TelemetrySchema, Timeline};
    use std::sync::Arc;

    fn timeline(frames: usize, timescale: u32, frame_duration: u32) -> Arc<Timeline> {
        let file = DashcamFileBuilder::new()
            .frames(frames)
            .keyframe_interval(30)
            .timescale(timescale)
            .frame_duration(frame_duration)
            .build();
        Arc::new(Timeline::build(file, &TelemetrySchema::dashcam()).unwrap())
    }

    fn attach(
        coordinator: &mut SyncCoordinator,
        angle: CameraAngle,
        timeline: Arc<Timeline>,
    ) -> Arc<RecordingSink> {
        let sink = Arc::new(RecordingSink::new());
        let engine = FrameEngine::new(
            timeline,
            Arc::new(ReferenceDecoder::new()),
            sink.clone(),
            EngineOptions::default(),
        );
        coordinator.attach(angle, engine);
        sink
    }

    #[test]
    fn test_camera_angle_parsing() {
        assert_eq!("front".parse::<CameraAngle>().unwrap(), CameraAngle::Front);
        assert_eq!(
            "Left-Repeater".parse::<CameraAngle>().unwrap(),
            CameraAngle::LeftRepeater
        );
        assert_eq!(CameraAngle::RightPillar.to_string(), "right_pillar");
        assert!("roof".parse::<CameraAngle>().is_err());
    }

    #[test]
    fn test_plan_maps_time_per_angle() {
        let mut coordinator = SyncCoordinator::new();
        // 30 fps front, 36 fps back
        attach(&mut coordinator, CameraAngle::Front, timeline(90, 30000, 1000));
        attach(&mut coordinator, CameraAngle::Back, timeline(108, 36000, 1000));
        attach(&mut coordinator, CameraAngle::LeftPillar, timeline(0, 30000, 1000));

        let plan = coordinator.plan(1500.0);
        assert_eq!(plan.get(&CameraAngle::Front), Some(&45));
        assert_eq!(plan.get(&CameraAngle::Back), Some(&54));
        assert!(!plan.contains_key(&CameraAngle::LeftPillar));
    }

    #[tokio::test]
    async fn test_seek_renders_every_angle() {
        let mut coordinator = SyncCoordinator::new();
        let front = attach(&mut coordinator, CameraAngle::Front, timeline(90, 30000, 1000));
        let back = attach(&mut coordinator, CameraAngle::Back, timeline(108, 36000, 1000));

        let outcome = coordinator.seek_to_time(CameraAngle::Front, 1500.0).await.unwrap();
        assert_eq!(outcome.primary, FrameOutcome::Rendered { index: 45, from_cache: false });
        assert_eq!(outcome.follower_angles(), vec![CameraAngle::Back]);

        let followers = outcome.join_followers().await;
        assert_eq!(followers.len(), 1);
        assert_matches!(
            followers[0],
            (CameraAngle::Back, Ok(FrameOutcome::Rendered { index: 54, .. }))
        );
        assert_eq!(front.rendered(), vec![45]);
        assert_eq!(back.rendered(), vec![54]);
    }

    #[tokio::test]
    async fn test_step_and_jump_follow_primary() {
        let mut coordinator = SyncCoordinator::new();
        attach(&mut coordinator, CameraAngle::Front, timeline(90, 30000, 1000));
        let back = attach(&mut coordinator, CameraAngle::Back, timeline(90, 30000, 1000));

        coordinator.seek_to_frame(CameraAngle::Front, 10).await.unwrap().join_followers().await;
        let outcome = coordinator.step(CameraAngle::Front, 1).await.unwrap();
        assert_eq!(outcome.primary, FrameOutcome::Rendered { index: 11, from_cache: true });
        outcome.join_followers().await;

        // Clamped at the start
        let outcome = coordinator.step(CameraAngle::Front, -100).await.unwrap();
        assert_matches!(outcome.primary, FrameOutcome::Rendered { index: 0, .. });
        outcome.join_followers().await;

        let outcome = coordinator.jump(CameraAngle::Front, 1000.0).await.unwrap();
        assert_matches!(outcome.primary, FrameOutcome::Rendered { index: 30, .. });
        outcome.join_followers().await;

        assert_eq!(back.rendered(), vec![10, 11, 0, 30]);
        let engine = coordinator.engine(CameraAngle::Back).unwrap();
        assert_eq!(engine.current_index(), 30);
    }

    #[tokio::test]
    async fn test_unknown_angle_and_detach() {
        let mut coordinator = SyncCoordinator::new();
        attach(&mut coordinator, CameraAngle::Front, timeline(10, 30000, 1000));

        assert_matches!(
            coordinator.seek_to_time(CameraAngle::Back, 0.0).await,
            Err(SyncError::UnknownAngle(CameraAngle::Back))
        );
        assert_matches!(
            coordinator.seek_to_frame(CameraAngle::Front, 10).await,
            Err(SyncError::Engine(EngineError::FrameOutOfRange { index: 10, len: 10 }))
        );

        let engine = coordinator.engine(CameraAngle::Front).unwrap().clone();
        assert!(coordinator.detach(CameraAngle::Front));
        assert!(engine.is_disposed());
        assert!(!coordinator.detach(CameraAngle::Front));
        assert!(coordinator.angles().is_empty());
    }
}
