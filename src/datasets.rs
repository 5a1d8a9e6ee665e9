//! MNIST loading: gzip-compressed IDX files, one-hot targets and the dataset download.
use crate::error::{DigitError, Result};
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Side length of an MNIST image.
pub const IMAGE_SIDE: usize = 28;
/// Pixels per image.
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

const LABEL_MAGIC: u32 = 2049;
const IMAGE_MAGIC: u32 = 2051;

/// A 28×28 grayscale image, row-major, raw intensities 0–255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitImage {
    pixels: Vec<u8>,
}

impl DigitImage {
    /// Wraps a row-major pixel buffer; it must hold exactly 784 bytes.
    pub fn from_raw(pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != IMAGE_PIXELS {
            return Err(DigitError::DataFormat(format!(
                "image buffer has {} bytes, expected {}",
                pixels.len(),
                IMAGE_PIXELS
            )));
        }
        Ok(Self { pixels })
    }

    /// An image with every pixel set to `value`.
    pub fn filled(value: u8) -> Self {
        Self {
            pixels: vec![value; IMAGE_PIXELS],
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at `(row, col)`; `None` outside the 28×28 grid.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row >= IMAGE_SIDE || col >= IMAGE_SIDE {
            return None;
        }
        self.pixels.get(row * IMAGE_SIDE + col).copied()
    }
}

/// Which half of MNIST to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn prefix(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "t10k",
        }
    }

    pub fn image_file(self) -> String {
        format!("{}-images-idx3-ubyte.gz", self.prefix())
    }

    pub fn label_file(self) -> String {
        format!("{}-labels-idx1-ubyte.gz", self.prefix())
    }
}

/// Images with their labels, index-aligned.
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub images: Vec<DigitImage>,
    pub labels: Vec<u8>,
}

impl LabeledSet {
    pub fn new(images: Vec<DigitImage>, labels: Vec<u8>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(DigitError::shape(
                "image/label count",
                images.len(),
                labels.len(),
            ));
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Keeps only the first `n` samples.
    pub fn truncate(&mut self, n: usize) {
        self.images.truncate(n);
        self.labels.truncate(n);
    }
}

/// One-hot encode
pub fn one_hot(label: usize, num_classes: usize) -> Vec<f64> {
    let mut v = vec![0.0; num_classes];
    if label < num_classes {
        v[label] = 1.0;
    }
    v
}

/// One-hot encode a batch of labels.
pub fn one_hot_batch(labels: &[u8], num_classes: usize) -> Vec<Vec<f64>> {
    labels
        .iter()
        .map(|&l| one_hot(l as usize, num_classes))
        .collect()
}

fn read_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut gz = GzDecoder::new(file);
    let mut contents = Vec::new();
    gz.read_to_end(&mut contents)
        .map_err(|e| DigitError::DataFormat(format!("gzip read error in {}: {}", path.display(), e)))?;
    Ok(contents)
}

fn header_u32(r: &mut Cursor<&[u8]>, what: &str) -> Result<u32> {
    r.read_u32::<BigEndian>()
        .map_err(|_| DigitError::DataFormat(format!("truncated header: missing {}", what)))
}

/// Parses decompressed IDX3 bytes.
pub fn parse_images(contents: &[u8]) -> Result<Vec<DigitImage>> {
    let mut r = Cursor::new(contents);
    let magic = header_u32(&mut r, "magic")?;
    if magic != IMAGE_MAGIC {
        return Err(DigitError::DataFormat(format!("invalid image magic: {}", magic)));
    }
    let count = header_u32(&mut r, "count")? as usize;
    let rows = header_u32(&mut r, "rows")? as usize;
    let cols = header_u32(&mut r, "cols")? as usize;
    if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
        return Err(DigitError::DataFormat(format!(
            "unsupported image size {}x{}",
            rows, cols
        )));
    }
    let data = &contents[r.position() as usize..];
    if data.len() != count * IMAGE_PIXELS {
        return Err(DigitError::DataFormat(format!(
            "image payload has {} bytes, header promises {} images ({} bytes)",
            data.len(),
            count,
            count * IMAGE_PIXELS
        )));
    }
    Ok(data
        .chunks_exact(IMAGE_PIXELS)
        .map(|chunk| DigitImage {
            pixels: chunk.to_vec(),
        })
        .collect())
}

/// Parses decompressed IDX1 bytes.
pub fn parse_labels(contents: &[u8]) -> Result<Vec<u8>> {
    let mut r = Cursor::new(contents);
    let magic = header_u32(&mut r, "magic")?;
    if magic != LABEL_MAGIC {
        return Err(DigitError::DataFormat(format!("invalid label magic: {}", magic)));
    }
    let count = header_u32(&mut r, "count")? as usize;
    let data = &contents[r.position() as usize..];
    if data.len() != count {
        return Err(DigitError::DataFormat(format!(
            "label payload has {} bytes, header promises {}",
            data.len(),
            count
        )));
    }
    if let Some(&bad) = data.iter().find(|&&l| l as usize >= NUM_CLASSES) {
        return Err(DigitError::DataFormat(format!("label {} out of range", bad)));
    }
    Ok(data.to_vec())
}

/// Load a gzip-compressed IDX3 image file.
pub fn load_images<P: AsRef<Path>>(path: P) -> Result<Vec<DigitImage>> {
    let path = path.as_ref();
    let images = parse_images(&read_gz(path)?)?;
    debug!(path = %path.display(), count = images.len(), "loaded images");
    Ok(images)
}

/// Load a gzip-compressed IDX1 label file.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let labels = parse_labels(&read_gz(path)?)?;
    debug!(path = %path.display(), count = labels.len(), "loaded labels");
    Ok(labels)
}

/// Load MNIST train/test from `dir` using the conventional file names.
pub fn load_split<P: AsRef<Path>>(dir: P, split: Split) -> Result<LabeledSet> {
    let dir = dir.as_ref();
    let images = load_images(dir.join(split.image_file()))?;
    let labels = load_labels(dir.join(split.label_file()))?;
    LabeledSet::new(images, labels)
}

/// All four MNIST file names.
pub fn mnist_files() -> [String; 4] {
    [
        Split::Train.image_file(),
        Split::Train.label_file(),
        Split::Test.image_file(),
        Split::Test.label_file(),
    ]
}

/// Makes sure all four MNIST files exist under `dir`, downloading the missing
/// ones from the first mirror that serves them.
pub fn ensure_downloaded<P: AsRef<Path>>(dir: P, mirrors: &[String]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut paths = Vec::new();
    for name in mnist_files() {
        let path = dir.join(&name);
        if !path.exists() {
            download_file(&name, &path, mirrors)?;
        }
        paths.push(path);
    }
    Ok(paths)
}

fn download_file(name: &str, dest: &Path, mirrors: &[String]) -> Result<()> {
    let mut last_err = format!("no mirrors configured for {}", name);
    for base in mirrors {
        let url = format!("{}/{}", base.trim_end_matches('/'), name);
        info!(%url, "downloading");
        match fetch(&url) {
            Ok(bytes) => {
                // only complete downloads get the final name
                let partial = dest.with_extension("part");
                fs::write(&partial, &bytes)?;
                fs::rename(&partial, dest)?;
                info!(file = name, bytes = bytes.len(), "download complete");
                return Ok(());
            }
            Err(e) => {
                warn!(%url, error = %e, "mirror failed");
                last_err = e;
            }
        }
    }
    Err(DigitError::Download(last_err))
}

fn fetch(url: &str) -> std::result::Result<Vec<u8>, String> {
    let resp = reqwest::blocking::get(url).map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {} for {}", resp.status(), url));
    }
    resp.bytes().map(|b| b.to_vec()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn idx_images(count: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(IMAGE_MAGIC).unwrap();
        buf.write_u32::<BigEndian>(count).unwrap();
        buf.write_u32::<BigEndian>(28).unwrap();
        buf.write_u32::<BigEndian>(28).unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    fn idx_labels(count: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(LABEL_MAGIC).unwrap();
        buf.write_u32::<BigEndian>(count).unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    fn write_gz(path: &Path, bytes: &[u8]) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn parses_images_in_order() {
        let mut payload = vec![0u8; 2 * IMAGE_PIXELS];
        payload[0] = 7;
        payload[IMAGE_PIXELS + 29] = 200;
        let images = parse_images(&idx_images(2, &payload)).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].get(0, 0), Some(7));
        assert_eq!(images[1].get(1, 1), Some(200));
        assert_eq!(images[1].get(0, IMAGE_SIDE), None);
        assert_eq!(images[1].get(IMAGE_SIDE, 0), None);
    }

    #[test]
    fn rejects_short_image_payload() {
        let payload = vec![0u8; IMAGE_PIXELS + 10];
        let err = parse_images(&idx_images(2, &payload)).unwrap_err();
        assert!(matches!(err, DigitError::DataFormat(_)));
    }

    #[test]
    fn rejects_label_count_mismatch_and_bad_magic() {
        assert!(matches!(
            parse_labels(&idx_labels(3, &[1, 2])),
            Err(DigitError::DataFormat(_))
        ));
        let mut bytes = idx_labels(1, &[1]);
        bytes[3] = 0;
        assert!(matches!(parse_labels(&bytes), Err(DigitError::DataFormat(_))));
        assert!(matches!(parse_labels(&[0, 0]), Err(DigitError::DataFormat(_))));
    }

    #[test]
    fn loads_split_from_gzip_files() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![128u8; 3 * IMAGE_PIXELS];
        write_gz(&dir.path().join(Split::Test.image_file()), &idx_images(3, &payload));
        write_gz(&dir.path().join(Split::Test.label_file()), &idx_labels(3, &[4, 5, 6]));
        let set = load_split(dir.path(), Split::Test).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.labels, vec![4, 5, 6]);
        assert!(set.images.iter().all(|img| img.pixels().iter().all(|&p| p == 128)));
    }

    #[test]
    fn split_with_mismatched_counts_fails() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![0u8; 2 * IMAGE_PIXELS];
        write_gz(&dir.path().join(Split::Train.image_file()), &idx_images(2, &payload));
        write_gz(&dir.path().join(Split::Train.label_file()), &idx_labels(1, &[0]));
        assert!(matches!(
            load_split(dir.path(), Split::Train),
            Err(DigitError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn existing_files_are_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        for name in mnist_files() {
            fs::write(dir.path().join(name), b"placeholder").unwrap();
        }
        let paths = ensure_downloaded(dir.path(), &[]).unwrap();
        assert_eq!(paths.len(), 4);
    }

    #[test]
    fn missing_files_without_mirrors_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ensure_downloaded(dir.path(), &[]), Err(DigitError::Download(_))));
    }

    /// Serves every `/mnist/<name>` request with `<name>` as the body.
    fn spawn_mirror() -> std::net::SocketAddr {
        use axum::extract::Path as UrlPath;
        use axum::routing::get;
        use axum::Router;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                let app = Router::new().route(
                    "/mnist/:name",
                    get(|UrlPath(name): UrlPath<String>| async move { name.into_bytes() }),
                );
                axum::serve(listener, app).await.unwrap();
            });
        });
        rx.recv().unwrap()
    }

    #[test]
    fn falls_back_to_next_mirror_and_renames_completed_files() {
        let addr = spawn_mirror();
        let dir = tempfile::tempdir().unwrap();
        let mirrors = vec!["http://127.0.0.1:1/dead".to_string(), format!("http://{}/mnist/", addr)];

        let paths = ensure_downloaded(dir.path(), &mirrors).unwrap();
        assert_eq!(paths.len(), 4);
        for (path, name) in paths.iter().zip(mnist_files()) {
            assert_eq!(fs::read(path).unwrap(), name.as_bytes());
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty(), "partial files left: {:?}", leftovers);
    }

    #[test]
    fn one_hot_encoding() {
        assert_eq!(one_hot(2, 4), vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(one_hot_batch(&[0, 1], 2), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn raw_image_must_be_784_bytes() {
        assert!(DigitImage::from_raw(vec![0; 10]).is_err());
        assert!(DigitImage::from_raw(vec![0; IMAGE_PIXELS]).is_ok());
    }
}
