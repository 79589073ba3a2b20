//! Record a short synthetic walk, then print its statistics, quality report and exports.
//!
//! Run with: cargo run --example record_session

use chrono::{DateTime, Duration, TimeZone, Utc};
use trajectory_core::{aggregate, coords, export, RawFix, TrackRecorder};

fn main() {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    // A walk north through Beijing with some noise, paired with the time each fix arrives
    let mut stream: Vec<(RawFix, DateTime<Utc>)> = Vec::new();
    for i in 0..30 {
        let noise = if i % 2 == 0 { 0.00002 } else { -0.00002 };
        let fix = RawFix {
            latitude: 39.9042 + i as f64 * 0.00005 + noise,
            longitude: 116.4074 + noise,
            altitude: 44.0 + (i as f64 * 0.3),
            speed: 1.4,
            horizontal_accuracy: 6.0,
            timestamp: t0 + Duration::seconds(i * 4),
        };
        stream.push((fix, fix.timestamp));
    }
    // A cached fix from a minute ago and a wild jump
    let cached = RawFix { timestamp: t0 - Duration::seconds(60), ..stream[3].0 };
    stream.push((cached, t0 + Duration::seconds(118)));
    let jump = RawFix { latitude: 39.95, timestamp: t0 + Duration::seconds(120), ..stream[29].0 };
    stream.push((jump, jump.timestamp));

    let mut recorder = TrackRecorder::default();
    recorder.start("walk-1", "Morning walk", t0);

    let total = stream.len();
    let accepted = recorder.ingest_all(stream.into_iter().map(|(fix, at)| (fix, true, at)));
    println!("Accepted {} of {} fixes\n", accepted, total);

    let Some(track) = recorder.stop(t0 + Duration::seconds(124)) else {
        return;
    };

    let stats = aggregate::summarize(&track);
    println!("Track '{}' ({} points)", track.name, stats.point_count);
    println!("  Duration:       {:.0}s", stats.duration_secs);
    println!("  Distance:       {:.1}m", stats.distance_meters.unwrap_or(0.0));
    match stats.average_speed_kmh {
        Some(v) => println!("  Average speed:  {:.1} km/h", v),
        None => println!("  Average speed:  n/a"),
    }
    println!("  Elevation gain: {:.1}m", stats.elevation_gain_meters);

    let report = aggregate::validate(&track);
    println!("\nQuality: {}", if report.is_valid { "ok" } else { "issues found" });
    for message in report.messages() {
        println!("  - {}", message);
    }

    if let Some(first) = track.points.first() {
        let shown = coords::to_display(first.latitude, first.longitude);
        println!(
            "\nFirst point WGS84 ({:.6}, {:.6}) -> map ({:.6}, {:.6})",
            first.latitude, first.longitude, shown.latitude, shown.longitude
        );
    }

    println!("\n{}", export::to_gpx(&track).lines().take(12).collect::<Vec<_>>().join("\n"));
    match export::to_csv(&track) {
        Ok(csv) => println!("\n{}", csv.lines().take(4).collect::<Vec<_>>().join("\n")),
        Err(e) => eprintln!("CSV export failed: {}", e),
    }
}
