use std::fmt::Write;

use chrono::{DateTime, Utc};
use netatmo_core::{Device, DeviceCollection};

/// Human-readable dump of every station and module.
pub fn collection(dc: &DeviceCollection, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    if dc.stations().is_empty() {
        out.push_str("No stations found for this account.\n");
        return out;
    }

    for station in dc.stations() {
        let _ = writeln!(out, "Station : {}", station.name());
        if let Some(place) = &station.place {
            let _ = writeln!(out, "\tCity: {}", place.city.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "\tCountry: {}", place.country.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "\tTimezone: {}", place.timezone.as_deref().unwrap_or("-"));
            if let (Some(lon), Some(lat)) = (place.longitude(), place.latitude()) {
                let _ = writeln!(out, "\tLongitude: {lon:.6}\n\tLatitude: {lat:.6}");
            }
            if let Some(alt) = place.altitude {
                let _ = writeln!(out, "\tAltitude: {alt}");
            }
        }
        out.push('\n');

        for module in station.modules_with_self() {
            device(&mut out, module, now);
        }
    }

    out
}

fn device(out: &mut String, module: &Device, now: DateTime<Utc>) {
    let _ = writeln!(out, "\tModule : {} ({})", module.name(), module.device_type);

    let (Ok(info), Ok(readings)) = (module.device_info(), module.sensor_readings()) else {
        let _ = writeln!(out, "\t\tSkipping {}, no measurement data available.", module.name());
        return;
    };

    let age = (now - info.measured_at).num_seconds();
    for (name, value) in &info.values {
        let _ = writeln!(out, "\t\t{name} : {value} (updated {age}s ago)");
    }
    for (name, value) in &readings.values {
        let _ = writeln!(out, "\t\t{name} : {value} (updated {age}s ago)");
    }
}
