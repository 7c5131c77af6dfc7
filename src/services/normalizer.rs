//! Forecast normalization.
//!
//! Collapses the 3-hour forecast samples returned by OpenWeatherMap into a
//! single "tomorrow" record in the location's own local time. Pure code, no
//! I/O: the caller fetches samples, we pick tomorrow's window, choose a
//! representative sample, and aggregate.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Icon used when the source returned no samples at all.
pub const DEFAULT_ICON_CODE: &str = "01d";

/// One discrete forecast sample from the source, UTC-timestamped.
///
/// Temperature fields are `None` when the source carried no measurement;
/// everything else is already defaulted at the wire boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub humidity: i32,
    pub pressure: i32,
    pub wind_speed: f64,
    pub wind_deg: i32,
    /// Probability of precipitation, 0.0–1.0.
    pub pop: f64,
    pub weather_main: String,
    pub weather_description: String,
    pub icon_code: String,
}

/// Normalized "tomorrow" forecast body, before it gets a (location, date)
/// identity attached by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TomorrowForecast {
    /// Local calendar date at the location (tomorrow in its own frame).
    pub forecast_date: NaiveDate,
    pub weather_main: String,
    pub weather_description: String,
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity: i32,
    pub pressure: i32,
    pub wind_speed: f64,
    pub wind_deg: i32,
    /// Integer percentage, 0–100, mean over tomorrow's samples (truncated).
    pub precipitation_probability: i32,
    pub icon_code: String,
}

/// Normalize a sample sequence into tomorrow's forecast, evaluated at the
/// current instant.
pub fn normalize(samples: &[RawSample], utc_offset_seconds: i32) -> TomorrowForecast {
    normalize_at(samples, utc_offset_seconds, Utc::now())
}

/// Normalize a sample sequence into tomorrow's forecast as seen from `now`.
///
/// "Tomorrow" is the local calendar date after `now` shifted by the
/// location's fixed UTC offset (DST is not modeled — the source only exposes
/// a constant offset per location). Never fails: partial or empty input
/// degrades to defaults.
pub fn normalize_at(
    samples: &[RawSample],
    utc_offset_seconds: i32,
    now: DateTime<Utc>,
) -> TomorrowForecast {
    let offset = FixedOffset::east_opt(utc_offset_seconds)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is always valid"));

    let local_now = now.with_timezone(&offset);
    let target_date = local_now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or_else(|| local_now.date_naive());

    // Partition into tomorrow's window, keeping local timestamps for the
    // representative pick below.
    let mut tomorrow: Vec<(NaiveDateTime, &RawSample)> = samples
        .iter()
        .map(|s| (s.timestamp.with_timezone(&offset).naive_local(), s))
        .filter(|(local, _)| local.date() == target_date)
        .collect();

    // The source window may not reach tomorrow; fall back to the earliest
    // sample in input order so the record still reflects something real.
    if tomorrow.is_empty() {
        if let Some(first) = samples.first() {
            tomorrow.push((first.timestamp.with_timezone(&offset).naive_local(), first));
        }
    }

    if tomorrow.is_empty() {
        return empty_forecast(target_date);
    }

    // Representative sample: local timestamp closest to local noon on the
    // target date. min_by_key keeps the first minimal element, so ties go to
    // the sample that appeared earlier in the input — do not replace this
    // with a sort.
    let noon = target_date
        .and_hms_opt(12, 0, 0)
        .unwrap_or_else(|| target_date.and_time(chrono::NaiveTime::default()));
    let (_, representative) = tomorrow
        .iter()
        .min_by_key(|(local, _)| (*local - noon).num_seconds().unsigned_abs())
        .copied()
        .expect("tomorrow set is non-empty here");

    let (temp_max, temp_min) = aggregate_temperatures(&tomorrow, representative);

    // Mean probability over the window, as a truncated integer percentage.
    // Truncation (not rounding) is deliberate: a mean of 49.9% reports 49.
    let pop_sum: f64 = tomorrow.iter().map(|(_, s)| s.pop * 100.0).sum();
    let precipitation_probability = (pop_sum / tomorrow.len() as f64) as i32;

    TomorrowForecast {
        forecast_date: target_date,
        weather_main: representative.weather_main.clone(),
        weather_description: representative.weather_description.clone(),
        temp_max: round1(temp_max),
        temp_min: round1(temp_min),
        humidity: representative.humidity,
        pressure: representative.pressure,
        wind_speed: representative.wind_speed,
        wind_deg: representative.wind_deg,
        precipitation_probability,
        icon_code: representative.icon_code.clone(),
    }
}

/// Daily max/min over the window. Each sample contributes its own max (or
/// point temperature when no explicit max exists), analogously for min.
/// Samples with no temperature measurement at all are skipped; if none
/// carry one, both aggregates fall back to the representative's point
/// temperature, or zero.
fn aggregate_temperatures(
    window: &[(NaiveDateTime, &RawSample)],
    representative: &RawSample,
) -> (f64, f64) {
    let maxes = window
        .iter()
        .filter_map(|(_, s)| s.temperature_max.or(s.temperature))
        .reduce(f64::max);
    let mins = window
        .iter()
        .filter_map(|(_, s)| s.temperature_min.or(s.temperature))
        .reduce(f64::min);

    let fallback = representative.temperature.unwrap_or(0.0);
    (maxes.unwrap_or(fallback), mins.unwrap_or(fallback))
}

/// Defaults for a completely empty sample sequence: zeros, empty strings,
/// and the fixed default icon.
fn empty_forecast(target_date: NaiveDate) -> TomorrowForecast {
    TomorrowForecast {
        forecast_date: target_date,
        weather_main: String::new(),
        weather_description: String::new(),
        temp_max: 0.0,
        temp_min: 0.0,
        humidity: 0,
        pressure: 0,
        wind_speed: 0.0,
        wind_deg: 0,
        precipitation_probability: 0,
        icon_code: DEFAULT_ICON_CODE.to_string(),
    }
}

/// Round to one decimal place (temperature aggregates only).
fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const JST: i32 = 9 * 3600;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>().unwrap()
    }

    fn sample(ts: &str) -> RawSample {
        RawSample {
            timestamp: utc(ts),
            temperature: Some(10.0),
            temperature_max: None,
            temperature_min: None,
            humidity: 60,
            pressure: 1013,
            wind_speed: 3.0,
            wind_deg: 180,
            pop: 0.0,
            weather_main: "Clouds".to_string(),
            weather_description: "broken clouds".to_string(),
            icon_code: "04d".to_string(),
        }
    }

    #[test]
    fn test_tomorrow_window_jst() {
        // UTC 2024-01-10T14:00 = local 2024-01-10T23:00+09:00 → tomorrow is 2024-01-11.
        let now = utc("2024-01-10T14:00:00Z");

        // Local 2024-01-11T00:00 — in the window.
        let mut first = sample("2024-01-10T15:00:00Z");
        first.weather_main = "InWindowStart".to_string();
        // Local 2024-01-11T21:00 — still in the window.
        let last = sample("2024-01-11T12:00:00Z");
        // Local 2024-01-12T00:00 — out.
        let mut out = sample("2024-01-11T15:00:00Z");
        out.pop = 1.0;

        let result = normalize_at(&[first, last, out], JST, now);
        assert_eq!(
            result.forecast_date,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
        // The out-of-window sample (pop=1.0) must not drag the mean up.
        assert_eq!(result.precipitation_probability, 0);
    }

    #[test]
    fn test_negative_offset_window() {
        // UTC-5: local now 2024-06-01T21:00-05:00 → tomorrow is 2024-06-02.
        let now = utc("2024-06-02T02:00:00Z");
        // UTC 2024-06-02T17:00 = local 2024-06-02T12:00 — in window.
        let s = sample("2024-06-02T17:00:00Z");
        let result = normalize_at(&[s], -5 * 3600, now);
        assert_eq!(
            result.forecast_date,
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
        assert_eq!(result.weather_main, "Clouds");
    }

    #[test]
    fn test_representative_closest_to_noon() {
        let now = utc("2024-01-10T14:00:00Z");
        // Local times on 2024-01-11: 09:00, 12:00, 15:00.
        let mut nine = sample("2024-01-11T00:00:00Z");
        nine.weather_main = "Nine".to_string();
        let mut noon = sample("2024-01-11T03:00:00Z");
        noon.weather_main = "Noon".to_string();
        let mut fifteen = sample("2024-01-11T06:00:00Z");
        fifteen.weather_main = "Fifteen".to_string();

        let result = normalize_at(&[nine, noon, fifteen], JST, now);
        assert_eq!(result.weather_main, "Noon");
    }

    #[test]
    fn test_representative_tie_breaks_to_earlier_input() {
        let now = utc("2024-01-10T14:00:00Z");
        // Local 11:00 and 13:00 — both one hour from noon. First in input wins.
        let mut eleven = sample("2024-01-11T02:00:00Z");
        eleven.weather_main = "Eleven".to_string();
        let mut thirteen = sample("2024-01-11T04:00:00Z");
        thirteen.weather_main = "Thirteen".to_string();

        let result = normalize_at(&[eleven.clone(), thirteen.clone()], JST, now);
        assert_eq!(result.weather_main, "Eleven");

        // Reversed input order flips the winner.
        let result = normalize_at(&[thirteen, eleven], JST, now);
        assert_eq!(result.weather_main, "Thirteen");
    }

    #[test]
    fn test_temperature_aggregation_uses_slot_extremes() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut a = sample("2024-01-11T00:00:00Z");
        a.temperature_max = Some(5.2);
        a.temperature_min = Some(1.0);
        let mut b = sample("2024-01-11T03:00:00Z");
        b.temperature_max = Some(7.8);
        b.temperature_min = Some(2.5);
        let mut c = sample("2024-01-11T06:00:00Z");
        c.temperature_max = Some(6.1);
        c.temperature_min = Some(0.4);

        let result = normalize_at(&[a, b, c], JST, now);
        assert_eq!(result.temp_max, 7.8);
        assert_eq!(result.temp_min, 0.4);
    }

    #[test]
    fn test_temperature_falls_back_to_point_temperature() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut a = sample("2024-01-11T00:00:00Z");
        a.temperature = Some(4.0);
        a.temperature_max = None;
        a.temperature_min = None;
        let mut b = sample("2024-01-11T03:00:00Z");
        b.temperature = Some(9.0);
        b.temperature_max = None;
        b.temperature_min = None;

        let result = normalize_at(&[a, b], JST, now);
        assert_eq!(result.temp_max, 9.0);
        assert_eq!(result.temp_min, 4.0);
    }

    #[test]
    fn test_no_temperature_measurements_default_to_representative() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut a = sample("2024-01-11T03:00:00Z");
        a.temperature = None;
        a.temperature_max = None;
        a.temperature_min = None;

        let result = normalize_at(&[a], JST, now);
        assert_eq!(result.temp_max, 0.0);
        assert_eq!(result.temp_min, 0.0);
    }

    #[test]
    fn test_pop_mean_truncates() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut a = sample("2024-01-11T00:00:00Z");
        a.pop = 0.10;
        let mut b = sample("2024-01-11T03:00:00Z");
        b.pop = 0.20;
        let mut c = sample("2024-01-11T06:00:00Z");
        c.pop = 0.15;

        let result = normalize_at(&[a, b, c], JST, now);
        // Mean is exactly 0.15 → 15.
        assert_eq!(result.precipitation_probability, 15);
    }

    #[test]
    fn test_pop_mean_truncates_not_rounds() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut a = sample("2024-01-11T00:00:00Z");
        a.pop = 0.499;
        let mut b = sample("2024-01-11T03:00:00Z");
        b.pop = 0.499;

        let result = normalize_at(&[a, b], JST, now);
        // Mean 49.9% → 49, never 50.
        assert_eq!(result.precipitation_probability, 49);
    }

    #[test]
    fn test_temperatures_rounded_to_one_decimal() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut a = sample("2024-01-11T03:00:00Z");
        a.temperature_max = Some(7.8456);
        a.temperature_min = Some(-0.04);

        let result = normalize_at(&[a], JST, now);
        assert_eq!(result.temp_max, 7.8);
        assert_eq!(result.temp_min, -0.0);
    }

    #[test]
    fn test_fallback_to_earliest_sample_when_window_empty() {
        let now = utc("2024-01-10T14:00:00Z");
        // Both samples are today (local), none tomorrow.
        let mut early = sample("2024-01-10T00:00:00Z");
        early.weather_main = "Earliest".to_string();
        early.pop = 0.5;
        let later = sample("2024-01-10T03:00:00Z");

        let result = normalize_at(&[early, later], JST, now);
        // Falls back to the single earliest sample; date stays tomorrow.
        assert_eq!(result.weather_main, "Earliest");
        assert_eq!(result.precipitation_probability, 50);
        assert_eq!(
            result.forecast_date,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn test_empty_input_yields_defaults() {
        let now = utc("2024-01-10T14:00:00Z");
        let result = normalize_at(&[], JST, now);

        assert_eq!(result.weather_main, "");
        assert_eq!(result.weather_description, "");
        assert_eq!(result.temp_max, 0.0);
        assert_eq!(result.temp_min, 0.0);
        assert_eq!(result.humidity, 0);
        assert_eq!(result.pressure, 0);
        assert_eq!(result.wind_speed, 0.0);
        assert_eq!(result.wind_deg, 0);
        assert_eq!(result.precipitation_probability, 0);
        assert_eq!(result.icon_code, DEFAULT_ICON_CODE);
        assert_eq!(
            result.forecast_date,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_offset_degrades_to_utc() {
        // FixedOffset only covers ±24h; anything beyond behaves like UTC.
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();
        let result = normalize_at(&[], 999_999, now);
        assert_eq!(
            result.forecast_date,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn test_scalar_fields_copied_from_representative() {
        let now = utc("2024-01-10T14:00:00Z");
        let mut rep = sample("2024-01-11T03:00:00Z"); // local noon
        rep.humidity = 82;
        rep.pressure = 998;
        rep.wind_speed = 7.4;
        rep.wind_deg = 270;
        rep.icon_code = "10d".to_string();
        rep.weather_description = "light rain".to_string();
        let other = sample("2024-01-11T09:00:00Z");

        let result = normalize_at(&[rep, other], JST, now);
        assert_eq!(result.humidity, 82);
        assert_eq!(result.pressure, 998);
        assert_eq!(result.wind_speed, 7.4);
        assert_eq!(result.wind_deg, 270);
        assert_eq!(result.icon_code, "10d");
        assert_eq!(result.weather_description, "light rain");
    }
}
