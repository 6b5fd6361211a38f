use depthcomp::{CompositingConfig, Compositor, DeliveryMode, DepthImage, Error, ImageSize};
use spmd::SelfComm;

mod common;
use common::{bits, random_image};

fn compositor(config: CompositingConfig) -> Compositor<'static> {
    Compositor::new(&SelfComm, config).unwrap()
}

#[test]
fn three_images_four_pixels() {
    common::try_init_logger_for_default_harness();

    let size = ImageSize::new(1, 4);
    let images = vec![
        DepthImage::new(size, vec![1.0, 5.0, 3.0, 9.0], vec![10.0; 4]).unwrap(),
        DepthImage::new(size, vec![2.0, 1.0, 3.0, 8.0], vec![20.0; 4]).unwrap(),
        DepthImage::new(size, vec![0.0, 6.0, 3.0, 7.0], vec![30.0; 4]).unwrap(),
    ];

    let out = compositor(CompositingConfig::new(size).with_depth_output(true))
        .composite(&images)
        .unwrap();

    assert!(out.is_valid());
    assert_eq!(out.depth(), Some(&[0.0, 1.0, 3.0, 7.0][..]));
    // Pixel 2 is a three-way tie, resolved by `TieBreak::LowestValue`
    assert_eq!(out.value(), &[30.0, 20.0, 10.0, 30.0]);
}

#[test]
fn identity_round_trip() {
    let size = ImageSize::new(7, 13);
    let mut image = random_image(size, 1);
    // Include values that don't survive a lossy round trip
    image.planes_mut().depth[0] = -0.0;
    image.planes_mut().value[1] = f32::from_bits(0x7fc0_1234);

    let out = compositor(
        CompositingConfig::new(size)
            .with_depth_output(true)
            .with_chunk_limit(10),
    )
    .composite(&[image.clone()])
    .unwrap();

    assert!(out.is_valid());
    assert_eq!(bits(out.value()), bits(image.value()));
    assert_eq!(bits(out.depth().unwrap()), bits(image.depth()));
}

#[test]
fn idempotence() {
    let size = ImageSize::new(16, 16);
    let image = random_image(size, 2);
    let compositor = compositor(CompositingConfig::new(size).with_depth_output(true));

    let once = compositor.composite(&[image.clone()]).unwrap();
    let twice = compositor.composite(&[image.clone(), image.clone()]).unwrap();

    assert_eq!(bits(once.value()), bits(twice.value()));
    assert_eq!(bits(once.depth().unwrap()), bits(twice.depth().unwrap()));
}

#[test]
fn commutativity() {
    let size = ImageSize::new(9, 11);
    let images: Vec<_> = (0..4).map(|i| random_image(size, 10 + i)).collect();
    let compositor = compositor(
        CompositingConfig::new(size)
            .with_depth_output(true)
            .with_chunk_limit(17),
    );

    let reference = compositor.composite(&images).unwrap();

    // Every rotation of the reversed list, and every rotation of the list
    for reversed in &[false, true] {
        for mid in 0..images.len() {
            let mut permuted = images.clone();
            if *reversed {
                permuted.reverse();
            }
            permuted.rotate_left(mid);

            let out = compositor.composite(&permuted).unwrap();
            assert_eq!(bits(out.value()), bits(reference.value()));
            assert_eq!(bits(out.depth().unwrap()), bits(reference.depth().unwrap()));
        }
    }
}

#[test]
fn chunking_invariance() {
    let size = ImageSize::new(1000, 1000);
    let images: Vec<_> = (0..3).map(|i| random_image(size, 20 + i)).collect();

    let outputs: Vec<_> = [1_000, 999_999, 1_000_000]
        .iter()
        .map(|&chunk_limit| {
            compositor(
                CompositingConfig::new(size)
                    .with_depth_output(true)
                    .with_chunk_limit(chunk_limit),
            )
            .composite(&images)
            .unwrap()
        })
        .collect();

    for out in &outputs[1..] {
        assert_eq!(bits(out.value()), bits(outputs[0].value()));
        assert_eq!(bits(out.depth().unwrap()), bits(outputs[0].depth().unwrap()));
    }
}

#[test]
fn value_only_output() {
    let size = ImageSize::new(2, 3);
    let out = compositor(CompositingConfig::new(size))
        .composite_owned(vec![random_image(size, 3), random_image(size, 4)])
        .unwrap();

    assert!(out.is_valid());
    assert_eq!(out.value().len(), 6);
    assert_eq!(out.depth(), None);

    let (value, depth) = out.into_planes();
    assert_eq!(value.len(), 6);
    assert!(depth.is_none());
}

#[test]
fn blank_images_contribute_nothing() {
    let size = ImageSize::new(3, 3);
    let image = random_image(size, 5);
    let blank = DepthImage::filled(size, f32::INFINITY, -1.0);

    let out = compositor(CompositingConfig::new(size).with_background(-1.0))
        .composite(&[blank.clone(), image.clone(), blank])
        .unwrap();

    assert_eq!(bits(out.value()), bits(image.value()));
}

#[test]
fn empty_input() {
    let size = ImageSize::new(2, 2);
    assert_eq!(
        compositor(CompositingConfig::new(size)).composite(&[]),
        Err(Error::EmptyInput)
    );
    assert_eq!(
        compositor(CompositingConfig::new(size)).composite_owned(Vec::new()),
        Err(Error::EmptyInput)
    );
}

#[test]
fn size_mismatch() {
    let size = ImageSize::new(4, 4);
    let err = compositor(CompositingConfig::new(size))
        .composite(&[random_image(ImageSize::new(4, 5), 6)])
        .unwrap_err();

    assert_eq!(
        err,
        Error::SizeMismatch {
            index: 0,
            expected: size,
            actual: ImageSize::new(4, 5),
        }
    );
    assert_eq!(
        err.to_string(),
        "input image 0 is 4×5, but the output size is 4×4"
    );
}

#[test]
fn distributed_delivery_requires_parallel_comm() {
    let size = ImageSize::new(2, 2);
    for &delivery in &[DeliveryMode::ToRoot(0), DeliveryMode::ToAll] {
        let out = compositor(CompositingConfig::new(size).with_delivery(delivery))
            .composite(&[random_image(size, 7)]);
        assert_eq!(out, Err(Error::NotDistributed));
    }
}

#[test]
fn signed_zero_depths_are_a_tie() {
    let size = ImageSize::new(1, 1);
    let images = [
        DepthImage::new(size, vec![0.0], vec![10.0]).unwrap(),
        DepthImage::new(size, vec![-0.0], vec![20.0]).unwrap(),
    ];
    let compositor = compositor(CompositingConfig::new(size));

    assert_eq!(compositor.composite(&images).unwrap().value(), &[10.0]);

    let reversed = [images[1].clone(), images[0].clone()];
    assert_eq!(compositor.composite(&reversed).unwrap().value(), &[10.0]);
}
