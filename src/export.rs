//! GPX and CSV export.
//!
//! Both formats write WGS84 coordinates in chronological order and skip unusable points
//! one by one; a bad point never aborts an export.
//!
//! | Format | Points skipped |
//! |--------|----------------|
//! | GPX | accuracy > 50 m, altitude outside [-500, 10000] m, non-finite coordinates |
//! | CSV | accuracy > 50 m, non-finite coordinates |
//!
//! The `*_gpx`/`*_csv` writers return how many points were exported. Only the destination
//! can fail, reported as [`crate::Error`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::SecondsFormat;
use log::info;

use crate::aggregate::{MAX_VALID_ALTITUDE, MIN_VALID_ALTITUDE};
use crate::{Result, Track, TrackPoint};

/// Value of the `creator` attribute on `<gpx>`.
pub const GPX_CREATOR: &str = "trajectory-core";

/// Points with a worse horizontal accuracy are left out of exports (meters).
pub const MAX_EXPORT_ACCURACY: f64 = 50.0;

pub const CSV_HEADER: [&str; 7] = [
    "Timestamp",
    "Latitude",
    "Longitude",
    "Altitude(m)",
    "Speed(m/s)",
    "Speed(km/h)",
    "Accuracy(m)",
];

fn csv_exportable(p: &TrackPoint) -> bool {
    p.position().is_valid() && p.horizontal_accuracy <= MAX_EXPORT_ACCURACY
}

fn gpx_exportable(p: &TrackPoint) -> bool {
    csv_exportable(p) && (MIN_VALID_ALTITUDE..=MAX_VALID_ALTITUDE).contains(&p.altitude)
}

fn iso8601(p: &TrackPoint) -> String {
    p.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// GPX
// ============================================================================

fn render_gpx(track: &Track) -> (String, usize) {
    let mut gpx = String::new();
    let mut exported = 0;

    gpx.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    gpx.push_str(&format!(
        "<gpx version=\"1.1\" creator=\"{}\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n",
        GPX_CREATOR
    ));
    gpx.push_str("  <trk>\n");
    gpx.push_str(&format!("    <name>{}</name>\n", escape_xml(&track.name)));
    gpx.push_str("    <trkseg>\n");

    for point in track.sorted_points().iter().filter(|p| gpx_exportable(p)) {
        gpx.push_str(&format!(
            "      <trkpt lat=\"{:.6}\" lon=\"{:.6}\">\n",
            point.latitude, point.longitude
        ));
        gpx.push_str(&format!("        <ele>{:.1}</ele>\n", point.altitude));
        gpx.push_str(&format!("        <time>{}</time>\n", iso8601(point)));
        if point.speed >= 0.0 {
            gpx.push_str(&format!("        <speed>{:.2}</speed>\n", point.speed));
        }
        gpx.push_str("      </trkpt>\n");
        exported += 1;
    }

    gpx.push_str("    </trkseg>\n");
    gpx.push_str("  </trk>\n");
    gpx.push_str("</gpx>\n");

    (gpx, exported)
}

/// Render a track as a GPX 1.1 document.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use trajectory_core::{export, Track, TrackPoint};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let mut track = Track::new("t-1", "Commute", t0);
/// track.points.push(TrackPoint {
///     latitude: 39.9042,
///     longitude: 116.4074,
///     altitude: 44.25,
///     speed: -1.0,
///     horizontal_accuracy: 6.0,
///     timestamp: t0,
/// });
///
/// let gpx = export::to_gpx(&track);
/// assert!(gpx.contains("<trkpt lat=\"39.904200\" lon=\"116.407400\">"));
/// assert!(gpx.contains("<time>2024-05-01T08:00:00Z</time>"));
/// assert!(!gpx.contains("<speed>"));
/// ```
pub fn to_gpx(track: &Track) -> String {
    render_gpx(track).0
}

/// Write a track as GPX, returning the number of exported points.
pub fn write_gpx<W: Write>(track: &Track, mut writer: W) -> Result<usize> {
    let (gpx, exported) = render_gpx(track);
    writer.write_all(gpx.as_bytes())?;
    writer.flush()?;

    info!(
        "[Export] Wrote {} of {} points of track {} as GPX",
        exported,
        track.points.len(),
        track.id
    );
    Ok(exported)
}

/// Write a track as GPX to `path`, creating or truncating the file.
pub fn save_gpx(track: &Track, path: impl AsRef<Path>) -> Result<usize> {
    let file = File::create(path)?;
    write_gpx(track, BufWriter::new(file))
}

// ============================================================================
// CSV
// ============================================================================

fn write_rows<W: Write>(track: &Track, wtr: &mut csv::Writer<W>) -> Result<usize> {
    wtr.write_record(CSV_HEADER)?;

    let mut exported = 0;
    for point in track.sorted_points().iter().filter(|p| csv_exportable(p)) {
        let speed = point.speed.max(0.0);
        wtr.write_record(&[
            iso8601(point),
            format!("{:.6}", point.latitude),
            format!("{:.6}", point.longitude),
            format!("{:.1}", point.altitude),
            format!("{:.2}", speed),
            format!("{:.2}", speed * 3.6),
            format!("{:.1}", point.horizontal_accuracy),
        ])?;
        exported += 1;
    }
    Ok(exported)
}

/// Write a track as CSV, returning the number of exported rows (header excluded).
pub fn write_csv<W: Write>(track: &Track, writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    let exported = write_rows(track, &mut wtr)?;
    wtr.flush()?;

    info!(
        "[Export] Wrote {} of {} points of track {} as CSV",
        exported,
        track.points.len(),
        track.id
    );
    Ok(exported)
}

/// Render a track as CSV text.
pub fn to_csv(track: &Track) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    write_rows(track, &mut wtr)?;
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Write a track as CSV to `path`, creating or truncating the file.
pub fn save_csv(track: &Track, path: impl AsRef<Path>) -> Result<usize> {
    let file = File::create(path)?;
    write_csv(track, BufWriter::new(file))
}
