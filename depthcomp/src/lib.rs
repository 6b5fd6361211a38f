//! Parallel sort-last depth compositing.
//!
//! Merges partial images, each carrying a depth and a scalar value per pixel,
//! into a single image where every pixel comes from the nearest contribution.
//! Partial images may be spread over several images held by one participant
//! and over several participants of an [`spmd`] participant set.
//!
//! A call to [`Compositor::composite`] goes through the following phases:
//!
//! ```text
//! Validating ─▶ LocalMerging? ─▶ DistributedMerging? ─▶ Assembling ─▶ Done
//! ```
//!
//!  - *Validating* rejects an empty input list, inputs whose size differs from
//!    the configured output size, and distributed delivery on a participant
//!    set that can't distribute. This happens before any collective call is
//!    issued so that a failing participant never leaves its peers blocked in
//!    a collective it won't enter.
//!  - *LocalMerging* ([`local`]) merges the images held by this participant.
//!    Skipped if there's only one.
//!  - *DistributedMerging* ([`dist`]) merges the participants' results using
//!    a collective reduction. Skipped for [`DeliveryMode::NoDistribution`].
//!  - *Assembling* ([`deliver`]) always runs, so the caller always gets an
//!    [`OutputImage`] of the same shape.
//!
//! Both merging phases are driven by [`chunk::merge_chunked`], which bounds
//! the peak memory usage by processing at most
//! [`CompositingConfig::chunk_limit`] pixels per step.
//!
//! # Restrictions
//!
//!  - The reduction callback has a fixed signature and reads the merge
//!    parameters from a per-thread slot ([`opreg`]). Compositing is not
//!    reentrant on one thread.
//!  - There is no timeout. A participant that stops entering collectives
//!    blocks its peers.
//!
//! # Examples
//!
//!     use depthcomp::{CompositingConfig, Compositor, DepthImage, ImageSize};
//!     use spmd::SelfComm;
//!
//!     let size = ImageSize::new(1, 2);
//!     let a = DepthImage::new(size, vec![1.0, 5.0], vec![10.0, 10.0]).unwrap();
//!     let b = DepthImage::new(size, vec![2.0, 4.0], vec![20.0, 20.0]).unwrap();
//!
//!     let compositor = Compositor::new(&SelfComm, CompositingConfig::new(size)).unwrap();
//!     let out = compositor.composite(&[a, b]).unwrap();
//!
//!     assert!(out.is_valid());
//!     assert_eq!(out.value(), &[10.0, 20.0]);
//!     assert_eq!(out.depth(), None);
//!
pub mod chunk;
mod compositor;
mod config;
pub mod deliver;
pub mod dist;
mod error;
mod image;
pub mod local;
pub mod opreg;
pub mod pixel;

pub use self::{
    compositor::*,
    config::*,
    deliver::OutputImage,
    error::*,
    image::*,
    pixel::{MergeParams, TieBreak, WirePixel},
};
