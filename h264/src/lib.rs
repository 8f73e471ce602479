//! Client-side H.264 Annex-B Access Unit demuxer.
//!
//! Reassembles the NAL-unit byte stream fed over the wire into complete
//! Access Units suitable for a browser's `VideoDecoder`, and extracts
//! the picture dimensions and codec string from the sequence parameter
//! set so playback can be configured before the first keyframe decodes.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]

mod bits;
mod demux;
mod nal;
mod sps;

pub use self::{
    demux::{Demuxer, FeedResult, Frame},
    nal::NalType,
    sps::Sps,
};
