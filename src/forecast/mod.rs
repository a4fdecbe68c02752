//! Six-week utilization forecast. One model call, strict validation, and a
//! synthetic fallback so callers always get a usable answer.

pub mod fallback;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::inference::InferenceProvider;
use crate::tools::extract::strip_fences;
use crate::types::{ChatMessage, InferenceRequest};

pub use fallback::fallback_forecast;

pub const FORECAST_WEEKS: usize = 6;
const WEEK_KEYS: [&str; 4] = ["week", "utilization", "hours", "bookings"];

/// Aggregated usage of one piece of equipment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageData {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub equipment_model: String,
    #[serde(default)]
    pub team_name: String,
    /// Fraction in 0..=1.
    #[serde(default)]
    pub utilization_rate: f64,
    #[serde(default)]
    pub usage_per_day: Vec<DailyUsage>,
    /// Hours.
    #[serde(default)]
    pub average_booking_duration: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyUsage {
    #[serde(default)]
    pub hours: f64,
}

impl UsageData {
    pub fn average_daily_hours(&self) -> f64 {
        if self.usage_per_day.is_empty() {
            return 0.0;
        }
        self.usage_per_day.iter().map(|d| d.hours).sum::<f64>() / self.usage_per_day.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Forecast {
    pub weeks: Vec<Value>,
    pub insights: String,
    pub source: ForecastSource,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ForecastError {
    #[error("response is not valid JSON: {0}")]
    Decode(String),
    #[error("response is not a JSON object")]
    NotObject,
    #[error("missing or non-string insights")]
    MissingInsights,
    #[error("missing forecast array")]
    MissingForecast,
    #[error("expected {FORECAST_WEEKS} weeks, got {0}")]
    WrongLength(usize),
    #[error("week {index} is missing {key}")]
    MissingKey { index: usize, key: &'static str },
}

pub struct ForecastEngine {
    provider: Arc<dyn InferenceProvider>,
    model: String,
}

impl ForecastEngine {
    pub fn new(provider: Arc<dyn InferenceProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Never fails: any model or validation problem yields the fallback.
    pub async fn forecast(&self, data: &UsageData) -> Forecast {
        let request = InferenceRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(forecast_prompt(data))],
        };

        let reason = match self.provider.infer(request).await {
            Ok(resp) => match validate(&resp.content) {
                Ok((weeks, insights)) => {
                    info!(team = %data.team_name, "forecast produced by model");
                    return Forecast {
                        weeks,
                        insights,
                        source: ForecastSource::Model,
                    };
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        warn!(reason = %reason, "using fallback forecast");
        let (weeks, insights) = fallback_forecast(data, &mut rand::thread_rng());
        Forecast {
            weeks,
            insights,
            source: ForecastSource::Fallback,
        }
    }
}

pub fn forecast_prompt(data: &UsageData) -> String {
    format!(
        "Analyze the following equipment usage data and forecast utilization for the next \
         {FORECAST_WEEKS} weeks.\n\n\
         Equipment: {} {}\n\
         Team: {}\n\
         Current utilization rate: {:.1}%\n\
         Average daily usage: {:.1} hours over {} recorded days\n\
         Average booking duration: {:.1} hours\n\n\
         Respond ONLY with a JSON object of exactly this shape, no additional text:\n\
         {{\"forecast\": [{{\"week\": \"Week 1\", \"utilization\": 72.5, \"hours\": 31.0, \"bookings\": 12}}, ...], \
         \"insights\": \"two or three sentences about trends and recommendations\"}}\n\
         The forecast array must contain exactly {FORECAST_WEEKS} entries, one per week. \
         Utilization is a percentage between 0 and 100.",
        data.manufacturer,
        data.equipment_model,
        data.team_name,
        data.utilization_rate * 100.0,
        data.average_daily_hours(),
        data.usage_per_day.len(),
        data.average_booking_duration,
    )
}

/// Check the model's reply has the required shape.
pub fn validate(raw: &str) -> Result<(Vec<Value>, String), ForecastError> {
    let text = strip_fences(raw).unwrap_or(raw.trim());
    // Tolerate prose around the object.
    let text = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };

    let value: Value =
        serde_json::from_str(text).map_err(|e| ForecastError::Decode(e.to_string()))?;
    let obj = value.as_object().ok_or(ForecastError::NotObject)?;

    let insights = obj
        .get("insights")
        .and_then(Value::as_str)
        .ok_or(ForecastError::MissingInsights)?;
    let weeks = obj
        .get("forecast")
        .and_then(Value::as_array)
        .ok_or(ForecastError::MissingForecast)?;

    if weeks.len() != FORECAST_WEEKS {
        return Err(ForecastError::WrongLength(weeks.len()));
    }
    for (index, week) in weeks.iter().enumerate() {
        for key in WEEK_KEYS {
            if week.get(key).is_none() {
                return Err(ForecastError::MissingKey { index, key });
            }
        }
    }

    Ok((weeks.clone(), insights.to_string()))
}
