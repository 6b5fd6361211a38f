use log::{debug, trace};
use spmd::Comm;
use std::borrow::Cow;

use super::{
    chunk::Target,
    deliver::{assemble, OutputImage},
    dist::{merge_distributed, reduction_target},
    local::merge_local,
    opreg::PixelReduction,
    CompositingConfig, DepthImage, Error,
};

/// The phases of a compositing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Validating,
    LocalMerging,
    DistributedMerging,
    Assembling,
    Done,
}

/// Composites partial images according to a [`CompositingConfig`] on one
/// participant of a participant set.
///
/// Holds a reference to the process-wide pixel reduction registration (see
/// [`opreg`](crate::opreg)) for its lifetime.
#[derive(Debug)]
pub struct Compositor<'c> {
    comm: &'c dyn Comm,
    config: CompositingConfig,
    reduction: PixelReduction,
}

impl<'c> Compositor<'c> {
    /// Construct a `Compositor`.
    ///
    /// Fails if the configuration is invalid or the communication layer's
    /// record size for pixels doesn't match the wire format.
    pub fn new(comm: &'c dyn Comm, config: CompositingConfig) -> Result<Self, Error> {
        if config.chunk_limit() == 0 {
            return Err(Error::ZeroChunkLimit);
        }

        let reduction = PixelReduction::acquire();
        reduction.verify(comm)?;

        Ok(Self {
            comm,
            config,
            reduction,
        })
    }

    pub fn config(&self) -> &CompositingConfig {
        &self.config
    }

    pub fn comm(&self) -> &'c dyn Comm {
        self.comm
    }

    /// Composite the partial images `inputs`.
    ///
    /// Unless the delivery mode is [`DeliveryMode::NoDistribution`], this is
    /// a collective operation and every participant must call it (or
    /// [`composite_owned`]) with the same configuration.
    ///
    /// A single input image is never copied before the assembling phase.
    ///
    /// [`DeliveryMode::NoDistribution`]: crate::DeliveryMode::NoDistribution
    /// [`composite_owned`]: Self::composite_owned
    pub fn composite(&self, inputs: &[DepthImage]) -> Result<OutputImage, Error> {
        self.run(inputs.iter().map(Cow::Borrowed).collect())
    }

    /// Like [`composite`](Self::composite), but takes the ownership of the
    /// input images. The first image's planes are reused for the local
    /// accumulator, and passed directly to the output if nothing else has to
    /// be merged.
    pub fn composite_owned(&self, inputs: Vec<DepthImage>) -> Result<OutputImage, Error> {
        self.run(inputs.into_iter().map(Cow::Owned).collect())
    }

    fn run(&self, inputs: Vec<Cow<'_, DepthImage>>) -> Result<OutputImage, Error> {
        let config = &self.config;
        let params = config.merge_params();
        let num_inputs = inputs.len();

        trace!("{:?}", Phase::Validating);
        let target = self.validate(&inputs)?;

        if num_inputs > 1 {
            trace!("{:?}: {} images", Phase::LocalMerging, num_inputs);
        }
        let accum = merge_local(inputs, params, config.chunk_limit())?;

        let result = if let Some(target) = target {
            trace!("{:?}: {:?}", Phase::DistributedMerging, target);
            let merged = merge_distributed(
                self.comm,
                target,
                &accum,
                &self.reduction,
                params,
                config.chunk_limit(),
            )?;

            // The accumulator has been consumed
            drop(accum);

            merged.map(Cow::Owned)
        } else {
            Some(accum)
        };

        trace!("{:?}", Phase::Assembling);
        let output = assemble(config.size(), result, config.wants_depth());

        debug!(
            "Composited {} local image(s) of size {} on rank {}/{} ({:?}, valid = {})",
            num_inputs,
            config.size(),
            self.comm.rank(),
            self.comm.size(),
            config.delivery(),
            output.is_valid(),
        );
        trace!("{:?}", Phase::Done);

        Ok(output)
    }

    /// Check everything that can be checked without communicating.
    fn validate(&self, inputs: &[Cow<'_, DepthImage>]) -> Result<Option<Target>, Error> {
        if inputs.is_empty() {
            return Err(Error::EmptyInput);
        }

        let expected = self.config.size();
        for (index, image) in inputs.iter().enumerate() {
            if image.size() != expected {
                return Err(Error::SizeMismatch {
                    index,
                    expected,
                    actual: image.size(),
                });
            }
        }

        reduction_target(self.comm, self.config.delivery())
    }
}
