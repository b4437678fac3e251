use std::{path::Path, time::SystemTime};

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use tracing::debug;

use crate::error::MediaError;

const MEBIBYTE: u64 = 1024 * 1024;
pub const MAX_PHOTO_BYTES: u64 = 5 * MEBIBYTE;
pub const MAX_VIDEO_BYTES: u64 = 25 * MEBIBYTE;

pub const DEFAULT_MAX_WIDTH: u32 = 1200;
pub const DEFAULT_QUALITY: f32 = 0.8;

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn max_bytes(self) -> u64 {
        match self {
            MediaKind::Photo => MAX_PHOTO_BYTES,
            MediaKind::Video => MAX_VIDEO_BYTES,
        }
    }
}

/// An in-memory file ready to be attached to a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub modified: SystemTime,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
            modified: SystemTime::now(),
        }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let io_err = |source| MediaError::Io {
            path: path.display().to_string(),
            source,
        };

        let bytes = tokio::fs::read(path).await.map_err(io_err)?;
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            modified,
            ..Self::new(name, mime_for_path(path), bytes)
        })
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

pub fn validate_file_size(file: &MediaFile, kind: MediaKind) -> Result<(), MediaError> {
    let limit = kind.max_bytes();
    if file.len() > limit {
        return Err(MediaError::FileTooLarge {
            file: file.name.clone(),
            limit_mib: limit / MEBIBYTE,
        });
    }
    Ok(())
}

/// Target dimensions for a resize bounded by `max_width`, keeping the aspect ratio.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (height as u64 * max_width as u64 / width as u64).max(1);
    (max_width, scaled as u32)
}

/// Re-encodes `file` as a JPEG no wider than `max_width`.
///
/// `quality` is in `0.0..=1.0`. The result keeps the source file name and gets a
/// fresh modification time; the source is left untouched.
pub fn compress_image(file: &MediaFile, max_width: u32, quality: f32) -> Result<MediaFile, MediaError> {
    let source = image::load_from_memory(&file.bytes).map_err(|source| MediaError::Decode {
        file: file.name.clone(),
        source,
    })?;

    let (width, height) = scaled_dimensions(source.width(), source.height(), max_width);
    let resized = if (width, height) == (source.width(), source.height()) {
        source
    } else {
        source.resize_exact(width, height, FilterType::Triangle)
    };

    // JPEG has no alpha channel
    let rgb = resized.to_rgb8();
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode(&rgb, width, height, image::ColorType::Rgb8.into())
        .map_err(|source| MediaError::Encode {
            file: file.name.clone(),
            source,
        })?;

    if encoded.is_empty() {
        return Err(MediaError::EmptyOutput {
            file: file.name.clone(),
        });
    }

    debug!(
        file = %file.name,
        from = file.len(),
        to = encoded.len(),
        width,
        height,
        "compressed image"
    );

    Ok(MediaFile {
        name: file.name.clone(),
        mime: "image/jpeg".to_string(),
        bytes: encoded,
        modified: SystemTime::now(),
    })
}

/// Validates and compresses every photo, in order.
///
/// The first failing file aborts the whole batch so that a submission never
/// carries only some of the user's photos.
pub fn prepare_photos(files: &[MediaFile]) -> Result<Vec<MediaFile>, MediaError> {
    files
        .iter()
        .map(|file| {
            validate_file_size(file, MediaKind::Photo)?;
            compress_image(file, DEFAULT_MAX_WIDTH, DEFAULT_QUALITY)
        })
        .collect()
}

/// Videos are only size-checked, never re-encoded.
pub fn prepare_video(file: MediaFile) -> Result<MediaFile, MediaError> {
    validate_file_size(&file, MediaKind::Video)?;
    Ok(file)
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    while exponent < SIZE_UNITS.len() - 1 && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let value = bytes as f64 / 1024f64.powi(exponent as i32);

    let rounded = format!("{value:.2}");
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, SIZE_UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> MediaFile {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        MediaFile::new("party.png", "image/png", bytes)
    }

    fn sized(name: &str, len: u64) -> MediaFile {
        MediaFile::new(name, "image/jpeg", vec![0u8; len as usize])
    }

    #[test]
    fn photo_limit_is_strictly_greater_than_five_mib() {
        assert!(validate_file_size(&sized("a.jpg", MAX_PHOTO_BYTES), MediaKind::Photo).is_ok());
        let err = validate_file_size(&sized("b.jpg", MAX_PHOTO_BYTES + 1), MediaKind::Photo)
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::FileTooLarge { ref file, limit_mib: 5 } if file == "b.jpg"
        ));
    }

    #[test]
    fn video_limit_is_twenty_five_mib() {
        let at_limit = MediaFile::new("v.mp4", "video/mp4", vec![0u8; MAX_VIDEO_BYTES as usize]);
        assert!(validate_file_size(&at_limit, MediaKind::Video).is_ok());
        // a photo of the same size is rejected
        assert!(validate_file_size(&at_limit, MediaKind::Photo).is_err());

        let over = MediaFile::new("w.mp4", "video/mp4", vec![0u8; MAX_VIDEO_BYTES as usize + 1]);
        let err = prepare_video(over).unwrap_err();
        assert_eq!(err.to_string(), "w.mp4 is too large. Maximum size is 25MB");
    }

    #[test]
    fn scaled_dimensions_keep_ratio() {
        assert_eq!(scaled_dimensions(2400, 1600, 1200), (1200, 800));
        assert_eq!(scaled_dimensions(3000, 1000, 1200), (1200, 400));
        assert_eq!(scaled_dimensions(1200, 900, 1200), (1200, 900));
        assert_eq!(scaled_dimensions(640, 480, 1200), (640, 480));
        assert_eq!(scaled_dimensions(5000, 1, 1200), (1200, 1));
    }

    #[test]
    fn compress_shrinks_wide_images() {
        let source = png(2400, 1600);
        let compressed = compress_image(&source, 1200, 0.8).unwrap();

        assert_eq!(compressed.name, "party.png");
        assert_eq!(compressed.mime, "image/jpeg");
        assert!(compressed.modified >= source.modified);

        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1200, 800));
    }

    #[test]
    fn compress_keeps_narrow_images_dimensions() {
        let source = png(800, 600);
        let compressed = compress_image(&source, 1200, 0.8).unwrap();
        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
    }

    #[test]
    fn compress_flattens_alpha() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 10]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let file = MediaFile::new("alpha.png", "image/png", bytes);

        assert!(compress_image(&file, 1200, 0.5).is_ok());
    }

    #[test]
    fn compress_rejects_undecodable_input() {
        let file = MediaFile::new("notes.jpg", "image/jpeg", b"not an image".to_vec());
        let err = compress_image(&file, 1200, 0.8).unwrap_err();
        assert!(matches!(err, MediaError::Decode { ref file, .. } if file == "notes.jpg"));
    }

    #[test]
    fn prepare_photos_aborts_on_first_bad_file() {
        let files = vec![png(100, 100), sized("huge.jpg", MAX_PHOTO_BYTES + 1), png(50, 50)];
        let err = prepare_photos(&files).unwrap_err();
        assert_eq!(err.file(), "huge.jpg");

        let ok = prepare_photos(&[png(1600, 400), png(300, 300)]).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(|f| f.mime == "image/jpeg"));
    }

    #[test]
    fn format_file_size_matches_expected_strings() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(mime_for_path(Path::new("README")), "application/octet-stream");
    }

    #[tokio::test]
    async fn open_reads_name_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toast.png");
        std::fs::write(&path, png(4, 4).bytes).unwrap();

        let file = MediaFile::open(&path).await.unwrap();
        assert_eq!(file.name, "toast.png");
        assert_eq!(file.mime, "image/png");
        assert!(!file.is_empty());
        assert_eq!(file.modified, std::fs::metadata(&path).unwrap().modified().unwrap());

        let missing = MediaFile::open(dir.path().join("nope.png")).await.unwrap_err();
        assert!(matches!(missing, MediaError::Io { .. }));
    }
}
