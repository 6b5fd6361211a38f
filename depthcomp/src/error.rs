use quick_error::quick_error;
use spmd::CommError;

use super::ImageSize;

quick_error! {
    #[derive(Debug, Clone, PartialEq)]
    pub enum Error {
        /// The input image list is empty.
        EmptyInput {
            display("the input image list is empty")
        }
        /// An input image's size differs from the configured output size.
        SizeMismatch { index: usize, expected: ImageSize, actual: ImageSize } {
            display("input image {} is {}, but the output size is {}", index, actual, expected)
        }
        /// A depth or value plane doesn't have the expected number of pixels.
        PlaneLength { expected: usize, actual: usize } {
            display("expected a plane of {} pixels, got {}", expected, actual)
        }
        ZeroChunkLimit {
            display("the chunk limit must be at least one pixel")
        }
        /// Distributed delivery was requested on a participant set that
        /// can't distribute: it's not backed by a parallel communication
        /// layer or it has only one participant.
        NotDistributed {
            display("distributed delivery was requested, but the participant set \
                     can't distribute")
        }
        InvalidRoot { root: usize, size: usize } {
            display("the root rank {} is out of range for a participant set of size {}",
                    root, size)
        }
        /// A participant that receives a result didn't supply destination
        /// planes.
        MissingDestination {
            display("destination planes are required on a receiving participant")
        }
        /// The wire representation of a pixel doesn't match the record size
        /// of the communication layer.
        WireSizeMismatch { wire: usize, layer: usize } {
            display("the pixel wire record is {} bytes, but the communication layer \
                     expects {} bytes", wire, layer)
        }
        Comm(err: CommError) {
            from()
            display("collective communication failed: {}", err)
        }
    }
}
