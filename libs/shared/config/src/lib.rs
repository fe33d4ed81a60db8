use std::env;
use std::str::FromStr;
use tracing::warn;

/// How the capacity check and the booking insert are bound together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityGuard {
    /// Count first, then insert. Concurrent attempts can overshoot capacity.
    #[default]
    Optimistic,
    /// Count and insert in one conditional write on the store side.
    Atomic,
}

impl FromStr for CapacityGuard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Ok(CapacityGuard::Optimistic),
            "atomic" => Ok(CapacityGuard::Atomic),
            other => Err(format!("unknown capacity guard '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub default_capacity: u32,
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub capacity_guard: CapacityGuard,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_capacity: 30,
            opening_hour: 9,
            closing_hour: 22,
            capacity_guard: CapacityGuard::Optimistic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    pub booking: BookingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = BookingConfig::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: parse_var("PORT", 3000),
            booking: BookingConfig {
                default_capacity: parse_var("BOOKING_DEFAULT_CAPACITY", defaults.default_capacity),
                opening_hour: parse_var("CLINIC_OPENING_HOUR", defaults.opening_hour),
                closing_hour: parse_var("CLINIC_CLOSING_HOUR", defaults.closing_hour),
                capacity_guard: parse_var("BOOKING_CAPACITY_GUARD", defaults.capacity_guard),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.booking.opening_hour >= config.booking.closing_hour {
            warn!(
                "Clinic opening hour {} is not before closing hour {}, no slot will be accepted",
                config.booking.opening_hour, config.booking.closing_hour
            );
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
