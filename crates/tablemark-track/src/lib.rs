//! Table marker tracking on top of a persisted projector-camera calibration.
//!
//! [`TrackingLoop`] reads frames from a [`tablemark_core::Camera`], runs a
//! [`tablemark_core::MarkerDetector`], maps every marker into table (or
//! projector) coordinates and hands a [`MarkersPayload`] to a [`Broadcast`]
//! sink. [`FanoutBroadcaster`] is the in-process sink that network
//! transports subscribe to.

mod broadcast;
mod payload;
mod tracker;

pub use broadcast::{Broadcast, FanoutBroadcaster, Subscription};
pub use payload::{MarkerMessage, MarkersPayload, MessageType, Position};
pub use tracker::{
    tracking_transform, OutputSpace, StopHandle, TrackingError, TrackingExit, TrackingLoop,
    TrackingParams, TrackingSummary,
};
