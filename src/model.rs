use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::codec::iso8601;

/// Every haul truck in the fleet reports exactly this many tyres.
pub const TYRE_COUNT: usize = 6;

/// Speed (km/h) above which a truck counts as moving.
pub const MOVING_THRESHOLD_KMH: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TruckModel {
    #[default]
    #[serde(rename = "Caterpillar 797F")]
    Cat797F,
    #[serde(rename = "Caterpillar 793F")]
    Cat793F,
    #[serde(rename = "Caterpillar 789D")]
    Cat789D,
    #[serde(rename = "Komatsu 980E-5")]
    Komatsu980E,
    #[serde(rename = "Komatsu 930E-5")]
    Komatsu930E,
    #[serde(rename = "Komatsu 830E-5")]
    Komatsu830E,
    #[serde(rename = "Liebherr T 284")]
    LiebherrT284,
    #[serde(rename = "Liebherr T 264")]
    LiebherrT264,
    #[serde(rename = "Hitachi EH5000AC-3")]
    HitachiEh5000,
    /// A model newer than this catalogue.
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl TruckModel {
    /// The tag this model carries on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckModel::Cat797F => "Caterpillar 797F",
            TruckModel::Cat793F => "Caterpillar 793F",
            TruckModel::Cat789D => "Caterpillar 789D",
            TruckModel::Komatsu980E => "Komatsu 980E-5",
            TruckModel::Komatsu930E => "Komatsu 930E-5",
            TruckModel::Komatsu830E => "Komatsu 830E-5",
            TruckModel::LiebherrT284 => "Liebherr T 284",
            TruckModel::LiebherrT264 => "Liebherr T 264",
            TruckModel::HitachiEh5000 => "Hitachi EH5000AC-3",
            TruckModel::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Empty,
    Loading,
    Loaded,
    Dumping,
    #[serde(other)]
    Unknown,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Empty => "empty",
            LoadStatus::Loading => "loading",
            LoadStatus::Loaded => "loaded",
            LoadStatus::Dumping => "dumping",
            LoadStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Manual,
    Autonomous,
    Remote,
    Maintenance,
    Standby,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrayPosition {
    #[default]
    Lowered,
    Raising,
    Raised,
    Lowering,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Pit,
    #[default]
    HaulRoad,
    Dump,
    Stockpile,
    Workshop,
    FuelBay,
    WashBay,
    Parking,
    Exclusion,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[default]
    Info,
    Warning,
    Critical,
    Emergency,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TyrePosition {
    FrontLeft,
    FrontRight,
    RearInnerLeft,
    RearInnerRight,
    RearOuterLeft,
    RearOuterRight,
}

impl TyrePosition {
    pub const ALL: [TyrePosition; TYRE_COUNT] = [
        TyrePosition::FrontLeft,
        TyrePosition::FrontRight,
        TyrePosition::RearInnerLeft,
        TyrePosition::RearInnerRight,
        TyrePosition::RearOuterLeft,
        TyrePosition::RearOuterRight,
    ];
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn default_tag() -> String {
    "default".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn full() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    truck_id: String,
    pub asset_number: String,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub model: TruckModel,
    #[serde(default = "default_tag")]
    pub fleet_id: String,
    #[serde(default = "default_tag")]
    pub site_id: String,
    #[serde(default = "default_version")]
    pub firmware_version: String,
    #[serde(default = "default_version")]
    pub hardware_version: String,
    #[serde(default, with = "iso8601::option")]
    pub registration_date: Option<DateTime<Utc>>,
}

impl Identification {
    pub fn new(truck_id: impl Into<String>, asset_number: impl Into<String>) -> Self {
        Self {
            truck_id: truck_id.into(),
            asset_number: asset_number.into(),
            vin: None,
            model: TruckModel::default(),
            fleet_id: default_tag(),
            site_id: default_tag(),
            firmware_version: default_version(),
            hardware_version: default_version(),
            registration_date: None,
        }
    }

    /// Stable identity of the truck; fixed for the lifetime of the record.
    pub fn truck_id(&self) -> &str {
        &self.truck_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Degrees, [0, 360).
    pub heading: f64,
    /// km/h
    pub speed: f64,
    /// metres
    pub accuracy: f64,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            heading: 0.0,
            speed: 0.0,
            accuracy: 1.0,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineMetrics {
    pub engine_hours: f64,
    pub engine_rpm: u32,
    pub engine_temp: f64,
    /// kPa
    pub oil_pressure: f64,
    pub oil_temp: f64,
    pub coolant_temp: f64,
    pub transmission_temp: f64,
    pub fuel_level: f64,
    /// L/hr
    pub fuel_consumption_rate: f64,
    pub throttle_position: f64,
    pub ignition_on: bool,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            engine_hours: 0.0,
            engine_rpm: 0,
            engine_temp: 0.0,
            oil_pressure: 0.0,
            oil_temp: 0.0,
            coolant_temp: 0.0,
            transmission_temp: 0.0,
            fuel_level: full(),
            fuel_consumption_rate: 0.0,
            throttle_position: 0.0,
            ignition_on: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadData {
    /// tonnes
    pub payload_weight: f64,
    pub max_payload: f64,
    pub load_status: LoadStatus,
    pub tray_position: TrayPosition,
    /// Loads this shift.
    pub cycle_count: u32,
    pub total_tonnes_hauled: f64,
}

impl Default for PayloadData {
    fn default() -> Self {
        Self {
            payload_weight: 0.0,
            max_payload: 400.0,
            load_status: LoadStatus::default(),
            tray_position: TrayPosition::default(),
            cycle_count: 0,
            total_tonnes_hauled: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TyreReading {
    pub position: TyrePosition,
    /// kPa
    pub pressure: f64,
    pub temperature: f64,
    #[serde(default = "full")]
    pub wear_percentage: f64,
    #[serde(default = "now", with = "iso8601")]
    pub last_checked: DateTime<Utc>,
}

impl TyreReading {
    pub fn new(position: TyrePosition, pressure: f64, temperature: f64) -> Self {
        Self {
            position,
            pressure,
            temperature,
            wear_percentage: full(),
            last_checked: Utc::now(),
        }
    }
}

fn default_tyres() -> [TyreReading; TYRE_COUNT] {
    TyrePosition::ALL.map(|position| TyreReading::new(position, 0.0, 0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakeSystem {
    pub brake_temp_front: f64,
    pub brake_temp_rear: f64,
    pub retarder_active: bool,
    pub retarder_temp: f64,
    pub brake_wear_front: f64,
    pub brake_wear_rear: f64,
    pub parking_brake_engaged: bool,
    pub emergency_brake_active: bool,
}

impl Default for BrakeSystem {
    fn default() -> Self {
        Self {
            brake_temp_front: 0.0,
            brake_temp_rear: 0.0,
            retarder_active: false,
            retarder_temp: 0.0,
            brake_wear_front: full(),
            brake_wear_rear: full(),
            parking_brake_engaged: true,
            emergency_brake_active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraulicSystem {
    pub hydraulic_pressure: f64,
    pub hydraulic_temp: f64,
    pub hydraulic_fluid_level: f64,
    pub steering_pressure: f64,
}

impl Default for HydraulicSystem {
    fn default() -> Self {
        Self {
            hydraulic_pressure: 0.0,
            hydraulic_temp: 0.0,
            hydraulic_fluid_level: full(),
            steering_pressure: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectricalSystem {
    pub battery_voltage: f64,
    /// Amps
    pub alternator_output: f64,
    pub main_power_on: bool,
    pub auxiliary_power_on: bool,
    pub communication_status: bool,
}

impl Default for ElectricalSystem {
    fn default() -> Self {
        Self {
            battery_voltage: 24.0,
            alternator_output: 0.0,
            main_power_on: false,
            auxiliary_power_on: false,
            communication_status: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyStatus {
    pub seatbelt_fastened: bool,
    pub operator_id: Option<String>,
    pub operator_logged_in: bool,
    /// 0-100, higher is better.
    pub fatigue_score: f64,
    pub emergency_stop_active: bool,
    pub horn_active: bool,
    pub lights_on: bool,
    pub beacon_active: bool,
    pub fire_suppression_armed: bool,
}

impl Default for SafetyStatus {
    fn default() -> Self {
        Self {
            seatbelt_fastened: false,
            operator_id: None,
            operator_logged_in: false,
            fatigue_score: full(),
            emergency_stop_active: false,
            horn_active: false,
            lights_on: false,
            beacon_active: false,
            fire_suppression_armed: true,
        }
    }
}

/// Proximity fields as reported by the on-board system. `None` on the
/// nearest-vehicle fields means no vehicle is in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityData {
    pub proximity_system_active: bool,
    pub nearest_vehicle_id: Option<String>,
    pub nearest_vehicle_distance: Option<f64>,
    pub nearest_vehicle_bearing: Option<f64>,
    pub collision_warning_active: bool,
    pub collision_warning_level: AlertSeverity,
    pub vehicles_in_range: BTreeSet<String>,
    pub zone_violations: BTreeSet<String>,
    #[serde(with = "iso8601")]
    pub last_proximity_scan: DateTime<Utc>,
}

impl Default for ProximityData {
    fn default() -> Self {
        Self {
            proximity_system_active: true,
            nearest_vehicle_id: None,
            nearest_vehicle_distance: None,
            nearest_vehicle_bearing: None,
            collision_warning_active: false,
            collision_warning_level: AlertSeverity::default(),
            vehicles_in_range: BTreeSet::new(),
            zone_violations: BTreeSet::new(),
            last_proximity_scan: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneInfo {
    pub current_zone_id: Option<String>,
    pub current_zone_type: ZoneType,
    pub current_zone_name: Option<String>,
    /// km/h
    pub speed_limit: f64,
    pub authorized_for_zone: bool,
    /// seconds
    pub time_in_zone: f64,
}

impl Default for ZoneInfo {
    fn default() -> Self {
        Self {
            current_zone_id: None,
            current_zone_type: ZoneType::default(),
            current_zone_name: None,
            speed_limit: 60.0,
            authorized_for_zone: true,
            time_in_zone: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OperationalMetrics {
    /// km
    pub odometer: f64,
    pub trip_distance: f64,
    pub operating_mode: OperatingMode,
    pub shift_id: Option<String>,
    #[serde(with = "iso8601::option")]
    pub shift_start_time: Option<DateTime<Utc>>,
    pub total_idle_time: f64,
    pub total_moving_time: f64,
    pub efficiency_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceInfo {
    #[serde(with = "iso8601::option")]
    pub last_service_date: Option<DateTime<Utc>>,
    pub last_service_hours: f64,
    pub next_service_due_hours: f64,
    /// Negative once the service is overdue.
    pub hours_until_service: f64,
    pub active_fault_codes: BTreeSet<String>,
    pub warning_lights: BTreeSet<String>,
    pub maintenance_mode: bool,
}

impl Default for MaintenanceInfo {
    fn default() -> Self {
        Self {
            last_service_date: None,
            last_service_hours: 0.0,
            next_service_due_hours: 500.0,
            hours_until_service: 500.0,
            active_fault_codes: BTreeSet::new(),
            warning_lights: BTreeSet::new(),
            maintenance_mode: false,
        }
    }
}

/// Full state snapshot of one haul truck at one instant.
///
/// A fresh record is built on every poll; nothing mutates a record that has
/// already been published. The identification block is only reachable
/// through accessors so the truck identity cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckTelemetry {
    #[serde(default)]
    identification: Option<Identification>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub engine: EngineMetrics,
    #[serde(default)]
    pub payload: PayloadData,
    #[serde(default)]
    pub brakes: BrakeSystem,
    #[serde(default)]
    pub hydraulics: HydraulicSystem,
    #[serde(default)]
    pub electrical: ElectricalSystem,
    #[serde(default = "default_tyres")]
    pub tyres: [TyreReading; TYRE_COUNT],
    #[serde(default)]
    pub safety: SafetyStatus,
    #[serde(default)]
    pub proximity: ProximityData,
    #[serde(default)]
    pub zone: ZoneInfo,
    #[serde(default)]
    pub operations: OperationalMetrics,
    #[serde(default)]
    pub maintenance: MaintenanceInfo,
    #[serde(default = "now", with = "iso8601")]
    pub last_updated: DateTime<Utc>,
    #[serde(default = "full")]
    pub data_quality_score: f64,
}

impl TruckTelemetry {
    pub fn new(identification: Identification) -> Self {
        Self::build(Some(identification))
    }

    /// A snapshot whose source did not report an identification block.
    pub fn unidentified() -> Self {
        Self::build(None)
    }

    /// Snapshot with the fleet's standard tyre set and the West Angelas
    /// reference position.
    pub fn with_defaults(truck_id: impl Into<String>, asset_number: impl Into<String>) -> Self {
        let mut identification = Identification::new(truck_id, asset_number);
        identification.registration_date = Some(Utc::now());

        let mut truck = Self::new(identification);
        truck.location.latitude = -23.3617;
        truck.location.longitude = 118.7083;
        truck.location.altitude = 600.0;
        truck.tyres = TyrePosition::ALL.map(|position| TyreReading::new(position, 700.0, 45.0));
        truck
    }

    fn build(identification: Option<Identification>) -> Self {
        Self {
            identification,
            location: Location::default(),
            engine: EngineMetrics::default(),
            payload: PayloadData::default(),
            brakes: BrakeSystem::default(),
            hydraulics: HydraulicSystem::default(),
            electrical: ElectricalSystem::default(),
            tyres: default_tyres(),
            safety: SafetyStatus::default(),
            proximity: ProximityData::default(),
            zone: ZoneInfo::default(),
            operations: OperationalMetrics::default(),
            maintenance: MaintenanceInfo::default(),
            last_updated: Utc::now(),
            data_quality_score: full(),
        }
    }

    pub fn identification(&self) -> Option<&Identification> {
        self.identification.as_ref()
    }

    pub fn truck_id(&self) -> Option<&str> {
        self.identification.as_ref().map(Identification::truck_id)
    }

    pub fn is_moving(&self) -> bool {
        self.location.speed > MOVING_THRESHOLD_KMH
    }

    pub fn is_loaded(&self) -> bool {
        self.payload.load_status == LoadStatus::Loaded
    }

    pub fn has_active_warnings(&self) -> bool {
        !self.maintenance.active_fault_codes.is_empty()
            || !self.maintenance.warning_lights.is_empty()
            || self.proximity.collision_warning_active
    }

    /// Checks the per-field bounds of the record. Cross-field consistency is
    /// not checked; timestamps moving backwards are clock skew, not an error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut checks = Checks::default();

        if let Some(ident) = &self.identification {
            checks.optional_timestamp("identification.registration_date", ident.registration_date);
        }
        checks.timestamp("last_updated", &self.last_updated);

        let loc = &self.location;
        checks.within("location.latitude", loc.latitude, -90.0, 90.0);
        checks.within("location.longitude", loc.longitude, -180.0, 180.0);
        checks.finite("location.altitude", loc.altitude);
        checks.heading("location.heading", loc.heading);
        checks.non_negative("location.speed", loc.speed);
        checks.non_negative("location.accuracy", loc.accuracy);
        checks.timestamp("location.timestamp", &loc.timestamp);

        let engine = &self.engine;
        checks.non_negative("engine.engine_hours", engine.engine_hours);
        checks.finite("engine.engine_temp", engine.engine_temp);
        checks.non_negative("engine.oil_pressure", engine.oil_pressure);
        checks.finite("engine.oil_temp", engine.oil_temp);
        checks.finite("engine.coolant_temp", engine.coolant_temp);
        checks.finite("engine.transmission_temp", engine.transmission_temp);
        checks.percentage("engine.fuel_level", engine.fuel_level);
        checks.non_negative("engine.fuel_consumption_rate", engine.fuel_consumption_rate);
        checks.percentage("engine.throttle_position", engine.throttle_position);

        checks.non_negative("payload.payload_weight", self.payload.payload_weight);
        checks.non_negative("payload.max_payload", self.payload.max_payload);
        checks.non_negative("payload.total_tonnes_hauled", self.payload.total_tonnes_hauled);

        let mut seen = HashSet::new();
        for tyre in &self.tyres {
            if !seen.insert(tyre.position) {
                checks.violation(format!("tyres: duplicate position {:?}", tyre.position));
            }
            checks.non_negative("tyres.pressure", tyre.pressure);
            checks.finite("tyres.temperature", tyre.temperature);
            checks.percentage("tyres.wear_percentage", tyre.wear_percentage);
            checks.timestamp("tyres.last_checked", &tyre.last_checked);
        }

        let brakes = &self.brakes;
        checks.finite("brakes.brake_temp_front", brakes.brake_temp_front);
        checks.finite("brakes.brake_temp_rear", brakes.brake_temp_rear);
        checks.finite("brakes.retarder_temp", brakes.retarder_temp);
        checks.percentage("brakes.brake_wear_front", brakes.brake_wear_front);
        checks.percentage("brakes.brake_wear_rear", brakes.brake_wear_rear);

        let hyd = &self.hydraulics;
        checks.non_negative("hydraulics.hydraulic_pressure", hyd.hydraulic_pressure);
        checks.finite("hydraulics.hydraulic_temp", hyd.hydraulic_temp);
        checks.percentage("hydraulics.hydraulic_fluid_level", hyd.hydraulic_fluid_level);
        checks.non_negative("hydraulics.steering_pressure", hyd.steering_pressure);

        checks.non_negative("electrical.battery_voltage", self.electrical.battery_voltage);
        checks.non_negative("electrical.alternator_output", self.electrical.alternator_output);

        checks.percentage("safety.fatigue_score", self.safety.fatigue_score);

        checks.timestamp("proximity.last_proximity_scan", &self.proximity.last_proximity_scan);
        if let Some(distance) = self.proximity.nearest_vehicle_distance {
            checks.non_negative("proximity.nearest_vehicle_distance", distance);
        }
        if let Some(bearing) = self.proximity.nearest_vehicle_bearing {
            checks.heading("proximity.nearest_vehicle_bearing", bearing);
        }

        checks.non_negative("zone.speed_limit", self.zone.speed_limit);
        checks.non_negative("zone.time_in_zone", self.zone.time_in_zone);

        let ops = &self.operations;
        checks.non_negative("operations.odometer", ops.odometer);
        checks.non_negative("operations.trip_distance", ops.trip_distance);
        checks.non_negative("operations.total_idle_time", ops.total_idle_time);
        checks.non_negative("operations.total_moving_time", ops.total_moving_time);
        checks.percentage("operations.efficiency_score", ops.efficiency_score);
        checks.optional_timestamp("operations.shift_start_time", ops.shift_start_time);

        let maint = &self.maintenance;
        checks.non_negative("maintenance.last_service_hours", maint.last_service_hours);
        checks.non_negative("maintenance.next_service_due_hours", maint.next_service_due_hours);
        checks.finite("maintenance.hours_until_service", maint.hours_until_service);
        checks.optional_timestamp("maintenance.last_service_date", maint.last_service_date);

        checks.percentage("data_quality_score", self.data_quality_score);

        checks.finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid telemetry: {}", violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

#[derive(Default)]
struct Checks {
    violations: Vec<String>,
}

impl Checks {
    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn finite(&mut self, field: &str, value: f64) -> bool {
        if value.is_finite() {
            true
        } else {
            self.violation(format!("{field} is not a finite number"));
            false
        }
    }

    fn within(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if self.finite(field, value) && !(min..=max).contains(&value) {
            self.violation(format!("{field}={value} outside [{min}, {max}]"));
        }
    }

    fn percentage(&mut self, field: &str, value: f64) {
        self.within(field, value, 0.0, 100.0);
    }

    fn non_negative(&mut self, field: &str, value: f64) {
        if self.finite(field, value) && value < 0.0 {
            self.violation(format!("{field}={value} is negative"));
        }
    }

    fn heading(&mut self, field: &str, value: f64) {
        if self.finite(field, value) && !(0.0..360.0).contains(&value) {
            self.violation(format!("{field}={value} outside [0, 360)"));
        }
    }

    // RFC 3339 only has room for a four-digit year.
    fn timestamp(&mut self, field: &str, value: &DateTime<Utc>) {
        if !(0..=9999).contains(&value.year()) {
            self.violation(format!("{field}={value} outside years 0000-9999"));
        }
    }

    fn optional_timestamp(&mut self, field: &str, value: Option<DateTime<Utc>>) {
        if let Some(value) = value {
            self.timestamp(field, &value);
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_default_truck_is_valid() {
        let truck = TruckTelemetry::with_defaults("TRK-001", "BHP-WA-001");
        assert_eq!(truck.truck_id(), Some("TRK-001"));
        assert_eq!(truck.tyres.len(), TYRE_COUNT);
        assert!(truck.identification().unwrap().registration_date.is_some());
        assert!(truck.validate().is_ok());
    }

    #[test]
    fn test_convenience_flags() {
        let mut truck = TruckTelemetry::with_defaults("TRK-002", "BHP-WA-002");
        assert!(!truck.is_moving());
        assert!(!truck.is_loaded());
        assert!(!truck.has_active_warnings());

        truck.location.speed = 35.5;
        truck.payload.load_status = LoadStatus::Loaded;
        truck.maintenance.warning_lights.insert("ENGINE_TEMP".to_string());

        assert!(truck.is_moving());
        assert!(truck.is_loaded());
        assert!(truck.has_active_warnings());
    }

    #[test]
    fn test_collision_warning_counts_as_active_warning() {
        let mut truck = TruckTelemetry::with_defaults("TRK-003", "BHP-WA-003");
        truck.proximity.collision_warning_active = true;
        assert!(truck.has_active_warnings());
    }

    #[test]
    fn test_validation_reports_each_violation() {
        let mut truck = TruckTelemetry::with_defaults("TRK-004", "BHP-WA-004");
        truck.location.heading = 360.0;
        truck.location.speed = -1.0;
        truck.engine.fuel_level = 101.0;
        truck.tyres[5].position = TyrePosition::FrontLeft;
        truck.proximity.nearest_vehicle_distance = Some(-3.0);

        let err = truck.validate().unwrap_err();
        assert_eq!(err.violations.len(), 5, "{err}");
        assert!(err.to_string().contains("location.heading"));
        assert!(err.to_string().contains("duplicate position"));
    }

    #[test]
    fn test_timestamps_beyond_year_9999_are_rejected() {
        let mut truck = TruckTelemetry::with_defaults("TRK-007", "BHP-WA-007");
        truck.last_updated = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        truck.operations.shift_start_time = Some(Utc.with_ymd_and_hms(-1, 6, 1, 0, 0, 0).unwrap());

        let err = truck.validate().unwrap_err();
        assert_eq!(err.violations.len(), 2, "{err}");
        assert!(err.to_string().contains("last_updated"));
        assert!(err.to_string().contains("operations.shift_start_time"));

        truck.last_updated = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        truck.operations.shift_start_time = None;
        assert!(truck.validate().is_ok());
    }

    #[test]
    fn test_overdue_service_is_not_a_violation() {
        let mut truck = TruckTelemetry::with_defaults("TRK-005", "BHP-WA-005");
        truck.maintenance.hours_until_service = -12.5;
        assert!(truck.validate().is_ok());
    }

    #[test]
    fn test_partial_snapshot_fills_defaults() {
        let truck: TruckTelemetry = serde_json::from_value(json!({
            "identification": { "truck_id": "TRK-006", "asset_number": "BHP-WA-006" },
            "payload": { "load_status": "loaded", "payload_weight": 320.0 }
        }))
        .expect("partial snapshot");

        assert_eq!(truck.truck_id(), Some("TRK-006"));
        assert!(truck.is_loaded());
        assert_eq!(truck.payload.max_payload, 400.0);
        assert_eq!(truck.engine.fuel_level, 100.0);
        assert_eq!(truck.tyres[0].position, TyrePosition::FrontLeft);
        assert_eq!(truck.identification().unwrap().site_id, "default");
    }

    #[test]
    fn test_missing_identification_decodes_as_unidentified() {
        let truck: TruckTelemetry = serde_json::from_value(json!({})).unwrap();
        assert_eq!(truck.truck_id(), None);
    }

    #[test]
    fn test_tyre_count_is_enforced_by_the_wire_shape() {
        let five = json!({
            "tyres": [
                { "position": "front_left", "pressure": 700.0, "temperature": 45.0 },
                { "position": "front_right", "pressure": 700.0, "temperature": 45.0 },
                { "position": "rear_inner_left", "pressure": 700.0, "temperature": 45.0 },
                { "position": "rear_inner_right", "pressure": 700.0, "temperature": 45.0 },
                { "position": "rear_outer_left", "pressure": 700.0, "temperature": 45.0 }
            ]
        });
        assert!(serde_json::from_value::<TruckTelemetry>(five).is_err());
    }

    #[test]
    fn test_enum_tags() {
        assert_eq!(
            serde_json::to_value(TruckModel::HitachiEh5000).unwrap(),
            json!("Hitachi EH5000AC-3")
        );
        assert_eq!(serde_json::to_value(ZoneType::HaulRoad).unwrap(), json!("haul_road"));
        assert_eq!(
            serde_json::to_value(TyrePosition::RearOuterRight).unwrap(),
            json!("rear_outer_right")
        );
        assert_eq!(
            serde_json::from_value::<AlertSeverity>(json!("critical")).unwrap(),
            AlertSeverity::Critical
        );
    }

    #[test]
    fn test_as_str_matches_wire_tag() {
        let models = [
            TruckModel::Cat797F,
            TruckModel::Cat793F,
            TruckModel::Cat789D,
            TruckModel::Komatsu980E,
            TruckModel::Komatsu930E,
            TruckModel::Komatsu830E,
            TruckModel::LiebherrT284,
            TruckModel::LiebherrT264,
            TruckModel::HitachiEh5000,
            TruckModel::Unknown,
        ];
        for model in models {
            assert_eq!(serde_json::to_value(model).unwrap(), json!(model.as_str()));
        }
        let statuses = [
            LoadStatus::Empty,
            LoadStatus::Loading,
            LoadStatus::Loaded,
            LoadStatus::Dumping,
            LoadStatus::Unknown,
        ];
        for status in statuses {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.as_str()));
        }
    }

    #[test]
    fn test_unrecognised_tags_decode_as_unknown() {
        let truck: TruckTelemetry = serde_json::from_value(json!({
            "identification": {
                "truck_id": "TRK-008",
                "asset_number": "BHP-WA-008",
                "model": "Belaz 75710"
            },
            "payload": { "load_status": "tipping", "tray_position": "tilted" },
            "zone": { "current_zone_type": "crusher" },
            "operations": { "operating_mode": "teleoperated" },
            "proximity": { "collision_warning_level": "severe" }
        }))
        .expect("newer catalogue values must not break decoding");

        assert_eq!(truck.truck_id(), Some("TRK-008"));
        assert_eq!(truck.identification().unwrap().model, TruckModel::Unknown);
        assert_eq!(truck.payload.load_status, LoadStatus::Unknown);
        assert_eq!(truck.payload.tray_position, TrayPosition::Unknown);
        assert_eq!(truck.zone.current_zone_type, ZoneType::Unknown);
        assert_eq!(truck.operations.operating_mode, OperatingMode::Unknown);
        assert_eq!(truck.proximity.collision_warning_level, AlertSeverity::Unknown);
    }

    #[test]
    fn test_tyre_positions_stay_strict() {
        let value = json!({ "position": "middle", "pressure": 700.0, "temperature": 45.0 });
        assert!(serde_json::from_value::<TyreReading>(value).is_err());
    }
}
