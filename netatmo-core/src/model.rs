use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NoDataAvailable;

/// Response of `GET /api/getstationsdata`: every station visible to the user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceCollection {
    pub body: DeviceCollectionBody,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceCollectionBody {
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl DeviceCollection {
    /// Root stations, in API order.
    pub fn stations(&self) -> &[Device] {
        &self.body.devices
    }

    /// Look up a station or module by its MAC address.
    pub fn find(&self, id: &str) -> Option<&Device> {
        self.stations().iter().find_map(|station| {
            if station.id == id {
                Some(station)
            } else {
                station.modules.iter().find(|m| m.id == id)
            }
        })
    }
}

/// Hardware kind, as reported in the `type` field. Missing or unrecognized
/// tags decode to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "NAMain")]
    MainStation,
    #[serde(rename = "NAModule1")]
    OutdoorModule,
    #[serde(rename = "NAModule2")]
    WindGauge,
    #[serde(rename = "NAModule3")]
    RainGauge,
    #[serde(rename = "NAModule4")]
    IndoorModule,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DeviceType {
    pub fn description(&self) -> &'static str {
        match self {
            DeviceType::MainStation => "base station",
            DeviceType::OutdoorModule => "outdoor module",
            DeviceType::WindGauge => "wind gauge",
            DeviceType::RainGauge => "rain gauge",
            DeviceType::IndoorModule => "indoor module",
            DeviceType::Unknown => "unknown device",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A station or one of its modules.
///
/// Stations carry `station_name`/`home_name`/`place` and the `modules` list;
/// modules carry `module_name` and radio/battery health. Stations never nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// MAC address, unique within one fetch.
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub device_type: DeviceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    /// Shared (guest) stations are read-only; owned ones are not.
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rf_status: Option<i64>,
    /// Measurement kinds the hardware provides, e.g. `["Temperature", "CO2"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<Place>,
    #[serde(default)]
    pub dashboard_data: DashboardData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Place {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// `[longitude, latitude]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<[f64; 2]>,
}

impl Place {
    pub fn longitude(&self) -> Option<f64> {
        self.location.map(|[lon, _]| lon)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.location.map(|[_, lat]| lat)
    }
}

/// Last values a device reported. Every field is independently optional:
/// absent means "not measured by this hardware", never zero. A device that
/// has not reported recently has no `time_utc` at all.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(
        rename = "time_utc",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub measured_at: Option<DateTime<Utc>>,
    /// °C
    #[serde(rename = "Temperature", default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// %
    #[serde(rename = "Humidity", default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// ppm
    #[serde(rename = "CO2", default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    /// dB
    #[serde(rename = "Noise", default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<f64>,
    /// Sea-level pressure, mbar
    #[serde(rename = "Pressure", default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    /// Measured pressure, mbar
    #[serde(rename = "AbsolutePressure", default, skip_serializing_if = "Option::is_none")]
    pub absolute_pressure: Option<f64>,
    /// mm
    #[serde(rename = "Rain", default, skip_serializing_if = "Option::is_none")]
    pub rain: Option<f64>,
    #[serde(rename = "sum_rain_1", default, skip_serializing_if = "Option::is_none")]
    pub rain_1_hour: Option<f64>,
    #[serde(rename = "sum_rain_24", default, skip_serializing_if = "Option::is_none")]
    pub rain_1_day: Option<f64>,
    /// 5 min average direction, degrees
    #[serde(rename = "WindAngle", default, skip_serializing_if = "Option::is_none")]
    pub wind_angle: Option<f64>,
    /// 5 min average speed, km/h
    #[serde(rename = "WindStrength", default, skip_serializing_if = "Option::is_none")]
    pub wind_strength: Option<f64>,
    #[serde(rename = "GustAngle", default, skip_serializing_if = "Option::is_none")]
    pub gust_angle: Option<f64>,
    #[serde(rename = "GustStrength", default, skip_serializing_if = "Option::is_none")]
    pub gust_strength: Option<f64>,
}

/// Canonical sensor reading names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reading {
    Temperature,
    Humidity,
    Co2,
    Noise,
    Pressure,
    AbsolutePressure,
    Rain,
    Rain1Hour,
    Rain1Day,
    WindAngle,
    WindStrength,
    GustAngle,
    GustStrength,
}

impl Reading {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reading::Temperature => "Temperature",
            Reading::Humidity => "Humidity",
            Reading::Co2 => "CO2",
            Reading::Noise => "Noise",
            Reading::Pressure => "Pressure",
            Reading::AbsolutePressure => "AbsolutePressure",
            Reading::Rain => "Rain",
            Reading::Rain1Hour => "Rain1Hour",
            Reading::Rain1Day => "Rain1Day",
            Reading::WindAngle => "WindAngle",
            Reading::WindStrength => "WindStrength",
            Reading::GustAngle => "GustAngle",
            Reading::GustStrength => "GustStrength",
        }
    }

    pub const fn all() -> &'static [Reading] {
        &[
            Reading::Temperature,
            Reading::Humidity,
            Reading::Co2,
            Reading::Noise,
            Reading::Pressure,
            Reading::AbsolutePressure,
            Reading::Rain,
            Reading::Rain1Hour,
            Reading::Rain1Day,
            Reading::WindAngle,
            Reading::WindStrength,
            Reading::GustAngle,
            Reading::GustStrength,
        ]
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical device health names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceInfoField {
    BatteryPercent,
    WifiStatus,
    RfStatus,
}

impl DeviceInfoField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceInfoField::BatteryPercent => "BatteryPercent",
            DeviceInfoField::WifiStatus => "WifiStatus",
            DeviceInfoField::RfStatus => "RFStatus",
        }
    }
}

impl std::fmt::Display for DeviceInfoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values present on a device at `measured_at`, keyed by canonical name.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<K, V> {
    pub measured_at: DateTime<Utc>,
    pub values: BTreeMap<K, V>,
}

pub type SensorReadings = Snapshot<Reading, f64>;
pub type DeviceInfo = Snapshot<DeviceInfoField, i64>;

impl DashboardData {
    /// Present sensor fields, in canonical order.
    pub fn readings(&self) -> BTreeMap<Reading, f64> {
        Reading::all()
            .iter()
            .filter_map(|r| self.value(*r).map(|v| (*r, v)))
            .collect()
    }

    pub fn value(&self, reading: Reading) -> Option<f64> {
        match reading {
            Reading::Temperature => self.temperature,
            Reading::Humidity => self.humidity,
            Reading::Co2 => self.co2,
            Reading::Noise => self.noise,
            Reading::Pressure => self.pressure,
            Reading::AbsolutePressure => self.absolute_pressure,
            Reading::Rain => self.rain,
            Reading::Rain1Hour => self.rain_1_hour,
            Reading::Rain1Day => self.rain_1_day,
            Reading::WindAngle => self.wind_angle,
            Reading::WindStrength => self.wind_strength,
            Reading::GustAngle => self.gust_angle,
            Reading::GustStrength => self.gust_strength,
        }
    }
}

impl Device {
    pub fn is_station(&self) -> bool {
        self.device_type == DeviceType::MainStation || !self.modules.is_empty()
    }

    /// Station name for stations, module name for modules.
    pub fn name(&self) -> &str {
        let preferred = if self.is_station() { &self.station_name } else { &self.module_name };
        preferred
            .as_deref()
            .or(self.module_name.as_deref())
            .or(self.station_name.as_deref())
            .unwrap_or(self.id.as_str())
    }

    pub fn is_owned(&self) -> bool {
        !self.read_only
    }

    /// Attached modules only, in API order.
    pub fn modules(&self) -> &[Device] {
        &self.modules
    }

    /// Attached modules followed by the station itself, so a caller can walk
    /// one flat list per station.
    pub fn modules_with_self(&self) -> Vec<&Device> {
        self.modules.iter().chain(std::iter::once(self)).collect()
    }

    pub fn has_data(&self) -> bool {
        self.dashboard_data.measured_at.is_some()
    }

    /// Sensor values present in the last report.
    pub fn sensor_readings(&self) -> Result<SensorReadings, NoDataAvailable> {
        let measured_at = self.measured_at()?;
        Ok(Snapshot { measured_at, values: self.dashboard_data.readings() })
    }

    /// Battery and radio health present on this device. Shares the dashboard
    /// timestamp, so an unreachable device has no info either.
    pub fn device_info(&self) -> Result<DeviceInfo, NoDataAvailable> {
        let measured_at = self.measured_at()?;

        let values = [
            (DeviceInfoField::BatteryPercent, self.battery_percent),
            (DeviceInfoField::WifiStatus, self.wifi_status),
            (DeviceInfoField::RfStatus, self.rf_status),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect();

        Ok(Snapshot { measured_at, values })
    }

    fn measured_at(&self) -> Result<DateTime<Utc>, NoDataAvailable> {
        self.dashboard_data
            .measured_at
            .ok_or_else(|| NoDataAvailable { device_id: self.id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn station_json() -> serde_json::Value {
        json!({
            "body": {
                "devices": [
                    {
                        "_id": "70:ee:50:00:00:01",
                        "type": "NAMain",
                        "station_name": "Home",
                        "home_name": "Home",
                        "module_name": "Living room",
                        "wifi_status": 56,
                        "read_only": false,
                        "data_type": ["Temperature", "CO2", "Humidity", "Noise", "Pressure"],
                        "place": {
                            "city": "Paris",
                            "country": "FR",
                            "timezone": "Europe/Paris",
                            "altitude": 35.0,
                            "location": [2.35, 48.85]
                        },
                        "dashboard_data": {
                            "time_utc": 1_700_000_000,
                            "Temperature": 21.5,
                            "Humidity": 45,
                            "CO2": 612,
                            "Noise": 38,
                            "Pressure": 1013.2,
                            "AbsolutePressure": 1009.1
                        },
                        "modules": [
                            {
                                "_id": "02:00:00:00:00:01",
                                "type": "NAModule1",
                                "module_name": "Garden",
                                "battery_percent": 80,
                                "rf_status": 70,
                                "dashboard_data": {
                                    "time_utc": 1_700_000_100,
                                    "Temperature": 0.0,
                                    "Humidity": 90
                                }
                            },
                            {
                                "_id": "05:00:00:00:00:01",
                                "type": "NAModule3",
                                "module_name": "Rain",
                                "battery_percent": 12,
                                "rf_status": 88
                            }
                        ]
                    },
                    {
                        "_id": "70:ee:50:00:00:02",
                        "type": "NAMain",
                        "station_name": "Cabin",
                        "read_only": true,
                        "dashboard_data": {}
                    }
                ]
            }
        })
    }

    fn collection() -> DeviceCollection {
        serde_json::from_value(station_json()).expect("fixture decodes")
    }

    #[test]
    fn stations_are_roots_in_api_order() {
        let dc = collection();
        let ids: Vec<&str> = dc.stations().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["70:ee:50:00:00:01", "70:ee:50:00:00:02"]);
        assert!(dc.stations()[0].is_owned());
        assert!(!dc.stations()[1].is_owned());
    }

    #[test]
    fn modules_with_self_ends_with_station() {
        let dc = collection();
        let station = &dc.stations()[0];

        assert_eq!(station.modules().len(), 2);

        let all = station.modules_with_self();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "02:00:00:00:00:01");
        assert_eq!(all[2].id, station.id);
    }

    #[test]
    fn names_follow_node_kind() {
        let dc = collection();
        let station = &dc.stations()[0];
        assert_eq!(station.name(), "Home");
        assert_eq!(station.modules()[0].name(), "Garden");
        assert_eq!(station.place.as_ref().and_then(Place::latitude), Some(48.85));
    }

    #[test]
    fn readings_contain_only_present_fields() {
        let dc = collection();
        let garden = &dc.stations()[0].modules()[0];

        let readings = garden.sensor_readings().expect("garden reported");
        assert_eq!(readings.measured_at.timestamp(), 1_700_000_100);

        let names: Vec<&str> = readings.values.keys().map(Reading::as_str).collect();
        assert_eq!(names, ["Temperature", "Humidity"]);
        // zero is a real value, not absence
        assert_eq!(readings.values.get(&Reading::Temperature), Some(&0.0));
        assert!(!readings.values.contains_key(&Reading::Co2));
    }

    #[test]
    fn single_temperature_reading() {
        let device: Device = serde_json::from_value(json!({
            "_id": "02:00:00:00:00:09",
            "type": "NAModule4",
            "module_name": "Bedroom",
            "dashboard_data": { "time_utc": 1_700_000_000, "Temperature": 21.5 }
        }))
        .expect("device decodes");

        let readings = device.sensor_readings().expect("has data");
        assert_eq!(readings.measured_at.timestamp(), 1_700_000_000);
        assert_eq!(readings.values.len(), 1);
        assert_eq!(readings.values[&Reading::Temperature], 21.5);
    }

    #[test]
    fn device_info_reports_present_health_fields() {
        let dc = collection();
        let station = &dc.stations()[0];

        let info = station.device_info().expect("station reported");
        assert_eq!(info.values.len(), 1);
        assert_eq!(info.values[&DeviceInfoField::WifiStatus], 56);

        let garden = station.modules()[0].device_info().expect("garden reported");
        assert_eq!(garden.values[&DeviceInfoField::BatteryPercent], 80);
        assert_eq!(garden.values[&DeviceInfoField::RfStatus], 70);
        assert!(!garden.values.contains_key(&DeviceInfoField::WifiStatus));
    }

    #[test]
    fn missing_timestamp_means_no_data_even_with_values() {
        let device: Device = serde_json::from_value(json!({
            "_id": "02:00:00:00:00:0a",
            "type": "NAModule1",
            "battery_percent": 50,
            "dashboard_data": { "Temperature": 12.0, "Humidity": 60 }
        }))
        .expect("device decodes");

        let err = device.sensor_readings().unwrap_err();
        assert_eq!(err.device_id, "02:00:00:00:00:0a");
        assert!(device.device_info().is_err());
    }

    #[test]
    fn unreachable_module_has_no_data() {
        let dc = collection();
        let rain = &dc.stations()[0].modules()[1];
        assert!(!rain.has_data());
        assert!(rain.sensor_readings().is_err());
        assert!(rain.device_info().is_err());
    }

    #[test]
    fn rain_sums_map_to_canonical_names() {
        let data: DashboardData = serde_json::from_value(json!({
            "time_utc": 1_700_000_000,
            "Rain": 0.2,
            "sum_rain_1": 1.1,
            "sum_rain_24": 7.5
        }))
        .expect("dashboard decodes");

        let names: Vec<&str> = data.readings().keys().map(Reading::as_str).collect();
        assert_eq!(names, ["Rain", "Rain1Hour", "Rain1Day"]);
    }

    #[test]
    fn full_dashboard_decodes_every_canonical_reading() {
        let data: DashboardData = serde_json::from_value(json!({
            "time_utc": 1_700_000_000,
            "Temperature": 19.25,
            "Humidity": 52,
            "CO2": 740,
            "Noise": 41,
            "Pressure": 1015.5,
            "AbsolutePressure": 1002.25,
            "Rain": 0.5,
            "sum_rain_1": 1.25,
            "sum_rain_24": 8.75,
            "WindAngle": 270,
            "WindStrength": 14,
            "GustAngle": 265,
            "GustStrength": 31
        }))
        .expect("dashboard decodes");

        let readings = data.readings();
        let keys: Vec<Reading> = readings.keys().copied().collect();
        assert_eq!(keys, Reading::all());

        let expected = [
            (Reading::Temperature, 19.25),
            (Reading::Humidity, 52.0),
            (Reading::Co2, 740.0),
            (Reading::Noise, 41.0),
            (Reading::Pressure, 1015.5),
            (Reading::AbsolutePressure, 1002.25),
            (Reading::Rain, 0.5),
            (Reading::Rain1Hour, 1.25),
            (Reading::Rain1Day, 8.75),
            (Reading::WindAngle, 270.0),
            (Reading::WindStrength, 14.0),
            (Reading::GustAngle, 265.0),
            (Reading::GustStrength, 31.0),
        ];
        for (reading, value) in expected {
            assert_eq!(readings[&reading], value, "{reading}");
        }
    }

    #[test]
    fn wind_gauge_reports_wind_and_gust_only() {
        let device: Device = serde_json::from_value(json!({
            "_id": "06:00:00:00:00:01",
            "type": "NAModule2",
            "module_name": "Roof",
            "battery_percent": 64,
            "rf_status": 71,
            "dashboard_data": {
                "time_utc": 1_700_000_200,
                "WindAngle": 180,
                "WindStrength": 9,
                "GustAngle": 175,
                "GustStrength": 22
            }
        }))
        .expect("wind gauge decodes");

        assert_eq!(device.device_type, DeviceType::WindGauge);
        let readings = device.sensor_readings().expect("wind gauge reported");
        let names: Vec<&str> = readings.values.keys().map(Reading::as_str).collect();
        assert_eq!(names, ["WindAngle", "WindStrength", "GustAngle", "GustStrength"]);
        assert_eq!(readings.values[&Reading::GustStrength], 22.0);
    }

    #[test]
    fn station_fixture_pressure_and_noise_values() {
        let dc = collection();
        let readings = dc.stations()[0].sensor_readings().expect("station reported");
        let names: Vec<&str> = readings.values.keys().map(Reading::as_str).collect();
        assert_eq!(
            names,
            ["Temperature", "Humidity", "CO2", "Noise", "Pressure", "AbsolutePressure"]
        );
        assert_eq!(readings.values[&Reading::Noise], 38.0);
        assert!((readings.values[&Reading::Pressure] - 1013.2).abs() < 1e-9);
        assert!((readings.values[&Reading::AbsolutePressure] - 1009.1).abs() < 1e-9);
    }

    #[test]
    fn missing_device_type_decodes_as_unknown() {
        let dc: DeviceCollection = serde_json::from_value(json!({
            "body": { "devices": [ { "_id": "70:ee:50:00:00:03", "station_name": "Attic" } ] }
        }))
        .expect("collection decodes without type");
        assert_eq!(dc.stations()[0].device_type, DeviceType::Unknown);
        assert_eq!(dc.stations()[0].name(), "Attic");
    }

    #[test]
    fn unknown_device_type_does_not_fail_decode() {
        let device: Device =
            serde_json::from_value(json!({ "_id": "x", "type": "NAModule9" })).expect("decodes");
        assert_eq!(device.device_type, DeviceType::Unknown);
        assert!(!device.has_data());
    }

    #[test]
    fn tree_survives_wire_round_trip() {
        let dc = collection();
        let wire = serde_json::to_string(&dc).expect("encodes");
        let back: DeviceCollection = serde_json::from_str(&wire).expect("decodes");

        assert_eq!(back, dc);
        for (a, b) in dc.stations().iter().zip(back.stations()) {
            for (ma, mb) in a.modules_with_self().into_iter().zip(b.modules_with_self()) {
                assert_eq!(ma.name(), mb.name());
                assert_eq!(ma.device_type, mb.device_type);
                assert_eq!(ma.sensor_readings(), mb.sensor_readings());
            }
        }
    }

    #[test]
    fn find_locates_modules() {
        let dc = collection();
        assert_eq!(dc.find("05:00:00:00:00:01").map(Device::name), Some("Rain"));
        assert!(dc.find("nope").is_none());
    }
}
