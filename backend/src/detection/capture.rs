use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag};
use std::io::Cursor;

/// Extracts the original capture timestamp from embedded EXIF data, falling
/// back to the current time when the image has no usable metadata. Trail
/// cameras frequently strip or mangle EXIF, so this never fails.
pub fn resolve_capture_date(image_bytes: &[u8]) -> DateTime<Utc> {
    read_datetime_original(image_bytes).unwrap_or_else(Utc::now)
}

fn read_datetime_original(image_bytes: &[u8]) -> Option<DateTime<Utc>> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(image_bytes))
        .ok()?;
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    parse_exif_datetime(&field.display_value().to_string())
}

/// EXIF encodes DateTimeOriginal as "YYYY:MM:DD HH:MM:SS"; the rendered
/// form uses hyphens in the date part. Accept both.
pub(crate) fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
