use crate::error::SensorError;

pub const MIN_VALID_TEMP_C: f32 = -40.0;
pub const MAX_VALID_TEMP_C: f32 = 125.0;
pub const MIN_VALID_HUMIDITY: f32 = 0.0;
pub const MAX_VALID_HUMIDITY: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: f32,
    pub humidity: f32,
}

/// Raw light sensor counts. Lower values mean brighter surroundings.
pub type LightLevel = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    NeverReceived,
    Stale { age_ms: u64 },
    SensorOffline,
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeverReceived => write!(f, "no reading received yet"),
            Self::Stale { age_ms } => write!(f, "reading is stale ({age_ms} ms old)"),
            Self::SensorOffline => write!(f, "sensor reported offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Available(T),
    Unavailable(Unavailable),
}

impl<T> Reading<T> {
    pub fn available(self) -> Option<T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot<T> {
    value: T,
    updated_ms: u64,
}

/// Latest value per sensor channel, with staleness tracking.
#[derive(Debug, Clone)]
pub struct SensorCache {
    stale_timeout_ms: u64,
    temperature: Option<Slot<f32>>,
    humidity: Option<Slot<f32>>,
    light: Option<Slot<LightLevel>>,
    offline: bool,
}

impl SensorCache {
    pub fn new(stale_timeout_ms: u64) -> Self {
        Self {
            stale_timeout_ms,
            temperature: None,
            humidity: None,
            light: None,
            offline: false,
        }
    }

    pub fn update_temperature(&mut self, celsius: f32, now_ms: u64) -> Result<(), SensorError> {
        check_range("temperature", celsius, MIN_VALID_TEMP_C, MAX_VALID_TEMP_C)?;
        self.temperature = Some(Slot {
            value: celsius,
            updated_ms: now_ms,
        });
        self.offline = false;
        Ok(())
    }

    pub fn update_humidity(&mut self, percent: f32, now_ms: u64) -> Result<(), SensorError> {
        check_range("humidity", percent, MIN_VALID_HUMIDITY, MAX_VALID_HUMIDITY)?;
        self.humidity = Some(Slot {
            value: percent,
            updated_ms: now_ms,
        });
        self.offline = false;
        Ok(())
    }

    pub fn update_light(&mut self, level: LightLevel, now_ms: u64) {
        self.light = Some(Slot {
            value: level,
            updated_ms: now_ms,
        });
        self.offline = false;
    }

    /// Every channel reads as unavailable until the next accepted update.
    pub fn mark_offline(&mut self) {
        self.offline = true;
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Both temperature and humidity must be fresh for a sample to exist.
    pub fn read_environment(&self, now_ms: u64) -> Reading<Sample> {
        let temperature = match self.read_slot(self.temperature, now_ms) {
            Reading::Available(value) => value,
            Reading::Unavailable(reason) => return Reading::Unavailable(reason),
        };
        let humidity = match self.read_slot(self.humidity, now_ms) {
            Reading::Available(value) => value,
            Reading::Unavailable(reason) => return Reading::Unavailable(reason),
        };
        Reading::Available(Sample {
            temperature,
            humidity,
        })
    }

    pub fn read_light(&self, now_ms: u64) -> Reading<LightLevel> {
        self.read_slot(self.light, now_ms)
    }

    /// Last accepted values regardless of age, for status reporting.
    pub fn last_temperature(&self) -> Option<f32> {
        self.temperature.map(|slot| slot.value)
    }

    pub fn last_humidity(&self) -> Option<f32> {
        self.humidity.map(|slot| slot.value)
    }

    pub fn last_light(&self) -> Option<LightLevel> {
        self.light.map(|slot| slot.value)
    }

    fn read_slot<T: Copy>(&self, slot: Option<Slot<T>>, now_ms: u64) -> Reading<T> {
        if self.offline {
            return Reading::Unavailable(Unavailable::SensorOffline);
        }
        let Some(slot) = slot else {
            return Reading::Unavailable(Unavailable::NeverReceived);
        };
        let age_ms = now_ms.saturating_sub(slot.updated_ms);
        if age_ms >= self.stale_timeout_ms {
            return Reading::Unavailable(Unavailable::Stale { age_ms });
        }
        Reading::Available(slot.value)
    }
}

fn check_range(quantity: &'static str, value: f32, min: f32, max: f32) -> Result<(), SensorError> {
    if !value.is_finite() {
        return Err(SensorError::NotFinite { quantity });
    }
    if !(min..=max).contains(&value) {
        return Err(SensorError::OutOfRange {
            quantity,
            value,
            min,
            max,
        });
    }
    Ok(())
}
