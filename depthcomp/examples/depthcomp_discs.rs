//! Renders a set of discs split across a participant set and composites the
//! partial images. Each participant renders a few discs into each of its
//! local images. The result is printed as ASCII art by every participant
//! that receives it.
use depthcomp::{CompositingConfig, Compositor, DeliveryMode, DepthImage, ImageSize};
use spmd::Comm;
use std::time::Instant;
use structopt::StructOpt;

struct Xorshift32(u32);

impl Xorshift32 {
    fn next(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "depthcomp_discs")]
struct Opt {
    /// The number of participants.
    #[structopt(short = "p", long = "participants", default_value = "4")]
    participants: usize,

    /// The number of local images per participant.
    #[structopt(short = "i", long = "images", default_value = "2")]
    images: usize,

    /// The number of discs per local image.
    #[structopt(short = "n", long = "discs", default_value = "3")]
    discs: usize,

    #[structopt(long = "rows", default_value = "24")]
    rows: usize,

    #[structopt(long = "cols", default_value = "64")]
    cols: usize,

    /// The maximum number of pixels per reduction step.
    #[structopt(short = "c", long = "chunk_limit", default_value = "256")]
    chunk_limit: usize,

    /// Deliver the result to every participant instead of rank 0.
    #[structopt(short = "a", long = "all")]
    all: bool,
}

const BACKGROUND: f32 = -1.0;

/// The character representing the value `v` in the ASCII art.
fn glyph(v: f32) -> char {
    if v == BACKGROUND {
        '.'
    } else {
        (b'a' + (v as u32 % 26) as u8) as char
    }
}

impl Opt {
    fn validate(&self) -> Result<(), String> {
        for &(name, value) in &[
            ("participants", self.participants),
            ("images", self.images),
            ("rows", self.rows),
            ("cols", self.cols),
        ] {
            if value == 0 {
                return Err(format!("--{} must be at least 1", name));
            }
        }
        Ok(())
    }

    fn delivery(&self) -> DeliveryMode {
        if self.participants == 1 {
            DeliveryMode::NoDistribution
        } else if self.all {
            DeliveryMode::ToAll
        } else {
            DeliveryMode::ToRoot(0)
        }
    }
}

fn render(size: ImageSize, rng: &mut Xorshift32, discs: usize, color_base: u32) -> DepthImage {
    let mut image = DepthImage::filled(size, f32::INFINITY, BACKGROUND);
    let planes = image.planes_mut();

    for i in 0..discs {
        let cx = (rng.next() as usize % size.cols) as f32;
        let cy = (rng.next() as usize % size.rows) as f32;
        let radius = (rng.next() % 8 + 2) as f32;
        let depth = (rng.next() % 1000) as f32;
        let color = ((color_base + i as u32) % 26) as f32;

        for y in 0..size.rows {
            for x in 0..size.cols {
                // Cells are about twice as tall as they are wide
                let (dx, dy) = (x as f32 - cx, (y as f32 - cy) * 2.0);
                let d2 = dx * dx + dy * dy;
                if d2 > radius * radius {
                    continue;
                }

                // A sphere-ish depth profile
                let z = depth - (radius * radius - d2).sqrt();
                let k = y * size.cols + x;
                if z < planes.depth[k] {
                    planes.depth[k] = z;
                    planes.value[k] = color;
                }
            }
        }
    }

    image
}

fn main() {
    env_logger::init();

    let opt = Opt::from_args();
    if let Err(e) = opt.validate() {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    let size = ImageSize::new(opt.rows, opt.cols);
    let config = CompositingConfig::new(size)
        .with_delivery(opt.delivery())
        .with_chunk_limit(opt.chunk_limit)
        .with_background(BACKGROUND);

    let opt = &opt;
    let outputs = spmd::run(opt.participants, move |comm| {
        let seed = (comm.rank() as u32 + 1).wrapping_mul(0x9e37_79b9);
        let mut rng = Xorshift32(0x1234_5678 ^ seed);
        let images: Vec<_> = (0..opt.images)
            .map(|i| {
                let color_base = ((comm.rank() * opt.images + i) * opt.discs) as u32;
                render(size, &mut rng, opt.discs, color_base)
            })
            .collect();

        let start = Instant::now();
        let result = Compositor::new(&comm, config).and_then(|c| c.composite_owned(images));
        (comm.rank(), start.elapsed(), result)
    });

    for (rank, elapsed, result) in outputs {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                eprintln!("rank {}: {}", rank, e);
                std::process::exit(1);
            }
        };

        println!("rank {}: {:?}, valid = {}", rank, elapsed, output.is_valid());

        if !output.is_valid() || (opt.all && rank != 0) {
            continue;
        }

        for row in output.value().chunks(size.cols) {
            let line: String = row.iter().cloned().map(glyph).collect();
            println!("{}", line);
        }
    }
}
