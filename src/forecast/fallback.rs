use rand::Rng;
use serde_json::{json, Value};

use super::UsageData;

const WEEKS: usize = 6;
const WORKDAYS_PER_WEEK: f64 = 5.0;
const UTILIZATION_SPREAD: f64 = 10.0;
const HOURS_SPREAD: f64 = 0.15;
const BOOKINGS_SPREAD: f64 = 0.20;

/// Synthetic forecast derived from the input aggregates. Values are random
/// within fixed ranges around the current figures.
pub fn fallback_forecast(data: &UsageData, rng: &mut impl Rng) -> (Vec<Value>, String) {
    let base_utilization = (data.utilization_rate * 100.0).clamp(0.0, 100.0);
    let base_hours = data.average_daily_hours() * WORKDAYS_PER_WEEK;
    let base_bookings = if data.average_booking_duration > 0.0 {
        (base_hours / data.average_booking_duration).max(1.0)
    } else {
        1.0
    };

    let weeks: Vec<Value> = (1..=WEEKS)
        .map(|week| {
            let utilization = (base_utilization
                + rng.gen_range(-UTILIZATION_SPREAD..=UTILIZATION_SPREAD))
            .clamp(0.0, 100.0);
            let hours = base_hours * (1.0 + rng.gen_range(-HOURS_SPREAD..=HOURS_SPREAD));
            let bookings = base_bookings * (1.0 + rng.gen_range(-BOOKINGS_SPREAD..=BOOKINGS_SPREAD));

            json!({
                "week": format!("Week {week}"),
                "utilization": round1(utilization),
                "hours": round1(hours.max(0.0)),
                "bookings": bookings.round().max(0.0) as u64,
            })
        })
        .collect();

    let insights = insights(data, base_utilization, &weeks);
    (weeks, insights)
}

fn insights(data: &UsageData, base_utilization: f64, weeks: &[Value]) -> String {
    let first = weeks.first().and_then(|w| w["utilization"].as_f64()).unwrap_or(0.0);
    let last = weeks.last().and_then(|w| w["utilization"].as_f64()).unwrap_or(0.0);
    let trend = if last > first + 2.0 {
        "an upward"
    } else if last < first - 2.0 {
        "a downward"
    } else {
        "a stable"
    };

    let load = if base_utilization >= 80.0 {
        "Demand is close to capacity; consider staggering bookings or adding a second unit."
    } else if base_utilization <= 30.0 {
        "The equipment is underused; it could be shared with other teams."
    } else {
        "Current capacity should cover the expected demand."
    };

    format!(
        "The {} {} used by {} runs at an average utilization of {:.1}%. \
         The next six weeks show {} trend, averaging {:.1} hours of use per day. {}",
        data.manufacturer,
        data.equipment_model,
        data.team_name,
        base_utilization,
        trend,
        data.average_daily_hours(),
        load
    )
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
