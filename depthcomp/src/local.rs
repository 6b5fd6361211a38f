//! Merging the partial images held by one participant.
use log::trace;
use std::borrow::Cow;

use super::{
    chunk::{merge_chunked, Route},
    DepthImage, Error, MergeParams,
};

/// Merge `inputs` into a single accumulator image.
///
/// If there's only one input, it's returned as it is; a borrowed image stays
/// borrowed and nothing is copied. Otherwise, the first image becomes the
/// accumulator (it's copied if borrowed) and the rest are merged into it one
/// by one.
///
/// Every input must have the same number of pixels.
pub fn merge_local<'a>(
    inputs: Vec<Cow<'a, DepthImage>>,
    params: MergeParams,
    chunk_limit: usize,
) -> Result<Cow<'a, DepthImage>, Error> {
    let mut inputs = inputs.into_iter();
    let first = inputs.next().ok_or(Error::EmptyInput)?;

    if inputs.len() == 0 {
        return Ok(first);
    }

    let mut accum = first.into_owned();
    let route = Route::Local(params);

    for (i, image) in inputs.enumerate() {
        let stats = merge_chunked(&route, image.planes(), Some(accum.planes_mut()), chunk_limit)?;
        trace!("merge_local: merged image {} ({:?})", i + 1, stats);
    }

    Ok(Cow::Owned(accum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageSize;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    fn image(depth: &[f32], value: &[f32]) -> DepthImage {
        DepthImage::new(ImageSize::new(1, depth.len()), depth.to_vec(), value.to_vec()).unwrap()
    }

    #[test]
    fn single_image_is_aliased() {
        let a = image(&[1.0, 2.0], &[3.0, 4.0]);
        let accum = merge_local(vec![Cow::Borrowed(&a)], MergeParams::default(), 16).unwrap();
        match accum {
            Cow::Borrowed(x) => assert!(std::ptr::eq(x, &a)),
            Cow::Owned(_) => panic!("the single input was copied"),
        }
    }

    #[test]
    fn three_images() {
        let images = [
            image(&[1.0, 5.0, 3.0, 9.0], &[10.0; 4]),
            image(&[2.0, 1.0, 3.0, 8.0], &[20.0; 4]),
            image(&[0.0, 6.0, 3.0, 7.0], &[30.0; 4]),
        ];
        let accum = merge_local(
            images.iter().map(Cow::Borrowed).collect(),
            MergeParams::default(),
            3,
        )
        .unwrap();

        assert_eq!(accum.depth(), &[0.0, 1.0, 3.0, 7.0]);
        assert_eq!(accum.value(), &[30.0, 20.0, 10.0, 30.0]);

        // The inputs are untouched
        assert_eq!(images[0].depth(), &[1.0, 5.0, 3.0, 9.0]);
    }

    #[test]
    fn empty() {
        assert_eq!(
            merge_local(Vec::new(), MergeParams::default(), 16),
            Err(Error::EmptyInput)
        );
    }

    #[quickcheck]
    fn order_independent(pixels: Vec<Vec<(i8, f32)>>, rotation: usize) -> TestResult {
        let len = match pixels.iter().map(Vec::len).min() {
            Some(len) => len,
            None => return TestResult::discard(),
        };

        let images: Vec<DepthImage> = pixels
            .iter()
            .map(|p| {
                let depth: Vec<f32> = p[..len].iter().map(|x| (x.0 % 8) as f32).collect();
                let value: Vec<f32> = p[..len].iter().map(|x| x.1).collect();
                image(&depth, &value)
            })
            .collect();

        let mut permuted = images.clone();
        permuted.reverse();
        let mid = rotation % permuted.len();
        permuted.rotate_left(mid);

        let merge = |images: Vec<DepthImage>| {
            merge_local(
                images.into_iter().map(Cow::Owned).collect(),
                MergeParams::default(),
                5,
            )
            .unwrap()
            .into_owned()
        };

        let (x, y) = (merge(images), merge(permuted));
        let bits = |x: &[f32]| x.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        if bits(x.depth()) != bits(y.depth()) || bits(x.value()) != bits(y.value()) {
            return TestResult::error(format!("{:?} != {:?}", x, y));
        }

        TestResult::passed()
    }
}
