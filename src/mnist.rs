use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use ndarray::Array2;

use crate::{
    dataset::{one_hot, Partition},
    error::{Error, Result},
};

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
/// Values per flattened image
pub const IMAGE_SIZE: usize = WIDTH * HEIGHT;
pub const CLASSES: usize = 10;

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

// file names with '-' and '.' removed
const TRAIN_IMAGES: &str = "trainimagesidx3ubyte";
const TRAIN_LABELS: &str = "trainlabelsidx1ubyte";
const TEST_IMAGES: &str = "t10kimagesidx3ubyte";
const TEST_LABELS: &str = "t10klabelsidx1ubyte";

/// The standard 60000/10000 split, pixels scaled to [0,1], labels one-hot
#[derive(Clone, Debug)]
pub struct Mnist {
    pub train: Partition,
    pub test: Partition,
}

/// Loads the four IDX files from `dir`.
///
/// Files can be downloaded from http://yann.lecun.com/exdb/mnist/ or one of
/// its mirrors, and may be left gzipped. Names are matched with `-` and `.`
/// ignored, so both `train-images-idx3-ubyte` and `train-images.idx3-ubyte`
/// are found.
pub fn load(dir: impl AsRef<Path>) -> Result<Mnist> {
    let dir = dir.as_ref();
    let mut train_images = None;
    let mut train_labels = None;
    let mut test_images = None;
    let mut test_labels = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase()
            .replace(['-', '.'], "");
        let name = name.strip_suffix("gz").unwrap_or(&name);
        match name {
            TRAIN_IMAGES => train_images = Some(path),
            TRAIN_LABELS => train_labels = Some(path),
            TEST_IMAGES => test_images = Some(path),
            TEST_LABELS => test_labels = Some(path),
            _ => {}
        }
    }

    let require = |path: Option<PathBuf>, name: &str| {
        path.ok_or_else(|| Error::Data(format!("{name} not found in {}", dir.display())))
    };
    let train = load_pair(
        &require(train_images, "train-images-idx3-ubyte")?,
        &require(train_labels, "train-labels-idx1-ubyte")?,
    )?;
    let test = load_pair(
        &require(test_images, "t10k-images-idx3-ubyte")?,
        &require(test_labels, "t10k-labels-idx1-ubyte")?,
    )?;
    log::info!(
        "loaded mnist from {}: {} train {} test images",
        dir.display(),
        train.len(),
        test.len()
    );
    Ok(Mnist { train, test })
}

fn load_pair(images: &Path, labels: &Path) -> Result<Partition> {
    let images = parse_images(&read_file(images)?)?;
    let labels = parse_labels(&read_file(labels)?)?;
    if images.nrows() != labels.len() {
        return Err(Error::Data(format!(
            "{} images but {} labels",
            images.nrows(),
            labels.len()
        )));
    }
    Partition::new(images, one_hot(&labels, CLASSES)?)
}

/// Whole file, decompressed when the name ends in `.gz`
fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz")) {
        GzDecoder::new(file).read_to_end(&mut buf)?;
    } else {
        file.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| Error::Data("idx header is truncated".into()))
}

/// Parses an IDX3 image file into one flattened row per image
pub fn parse_images(bytes: &[u8]) -> Result<Array2<f32>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        return Err(Error::Data(format!(
            "image file magic is {magic}, expected {IMAGES_MAGIC}"
        )));
    }
    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;
    if (rows, cols) != (HEIGHT, WIDTH) {
        return Err(Error::Data(format!(
            "images are {rows}x{cols}, expected {HEIGHT}x{WIDTH}"
        )));
    }
    let pixels = &bytes[16..];
    if pixels.len() != count * IMAGE_SIZE {
        return Err(Error::Data(format!(
            "header says {count} images but file holds {} bytes of pixels",
            pixels.len()
        )));
    }
    Array2::from_shape_vec(
        (count, IMAGE_SIZE),
        pixels.iter().map(|&p| p as f32 / 255.).collect(),
    )
    .map_err(|e| Error::Shape(e.to_string()))
}

/// Parses an IDX1 label file
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let magic = read_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        return Err(Error::Data(format!(
            "label file magic is {magic}, expected {LABELS_MAGIC}"
        )));
    }
    let count = read_u32(bytes, 4)? as usize;
    let labels = &bytes[8..];
    if labels.len() != count {
        return Err(Error::Data(format!(
            "header says {count} labels but file holds {}",
            labels.len()
        )));
    }
    Ok(labels.to_vec())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    pub(crate) fn image_bytes(count: usize) -> Vec<u8> {
        let mut bytes = vec![];
        for v in [IMAGES_MAGIC, count as u32, HEIGHT as u32, WIDTH as u32] {
            bytes.extend(v.to_be_bytes());
        }
        for i in 0..count {
            bytes.extend((0..IMAGE_SIZE).map(|p| ((p + i * 31) % 256) as u8));
        }
        bytes
    }

    pub(crate) fn label_bytes(labels: &[u8]) -> Vec<u8> {
        let mut bytes = vec![];
        bytes.extend(LABELS_MAGIC.to_be_bytes());
        bytes.extend((labels.len() as u32).to_be_bytes());
        bytes.extend(labels);
        bytes
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(vec![], Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn parses_images() {
        let images = parse_images(&image_bytes(3)).unwrap();
        assert_eq!(images.dim(), (3, IMAGE_SIZE));
        assert_eq!(images[[0, 255]], 1.);
        assert_eq!(images[[0, 0]], 0.);
        assert!(images.iter().all(|&p| (0. ..=1.).contains(&p)));
    }

    #[test]
    fn rejects_bad_headers() {
        let mut bytes = image_bytes(1);
        bytes[3] = 0;
        assert!(matches!(parse_images(&bytes), Err(Error::Data(_))));

        let mut bytes = image_bytes(2);
        bytes.pop();
        assert!(matches!(parse_images(&bytes), Err(Error::Data(_))));

        assert!(matches!(parse_images(&[0, 0]), Err(Error::Data(_))));
        assert!(matches!(parse_labels(&image_bytes(1)), Err(Error::Data(_))));
    }

    #[test]
    fn parses_labels() {
        assert_eq!(parse_labels(&label_bytes(&[7, 0, 9])).unwrap(), vec![7, 0, 9]);
    }

    #[test]
    fn loads_plain_and_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        std::fs::write(p.join("train-images-idx3-ubyte.gz"), gzip(&image_bytes(4))).unwrap();
        std::fs::write(p.join("train-labels.idx1-ubyte"), label_bytes(&[1, 2, 3, 4])).unwrap();
        std::fs::write(p.join("t10k-images-idx3-ubyte"), image_bytes(2)).unwrap();
        std::fs::write(p.join("t10k-labels-idx1-ubyte.gz"), gzip(&label_bytes(&[5, 6]))).unwrap();
        std::fs::write(p.join("readme.txt"), "ignored").unwrap();

        let mnist = load(p).unwrap();
        assert_eq!(mnist.train.len(), 4);
        assert_eq!(mnist.test.len(), 2);
        assert_eq!(mnist.train.input_size(), IMAGE_SIZE);
        assert_eq!(mnist.test.targets().row(1)[6], 1.);
    }

    #[test]
    fn missing_or_mismatched_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        assert!(matches!(load(p), Err(Error::Data(_))));

        std::fs::write(p.join("train-images-idx3-ubyte"), image_bytes(3)).unwrap();
        std::fs::write(p.join("train-labels-idx1-ubyte"), label_bytes(&[1, 2])).unwrap();
        std::fs::write(p.join("t10k-images-idx3-ubyte"), image_bytes(1)).unwrap();
        std::fs::write(p.join("t10k-labels-idx1-ubyte"), label_bytes(&[1])).unwrap();
        assert!(matches!(load(p), Err(Error::Data(_))));

        // label outside the ten classes
        std::fs::write(p.join("train-labels-idx1-ubyte"), label_bytes(&[1, 2, 10])).unwrap();
        assert!(matches!(load(p), Err(Error::Data(_))));
    }
}
