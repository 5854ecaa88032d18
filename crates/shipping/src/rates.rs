//! Quoted rates and how to pick one.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// A price offered by a carrier for a service level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub provider: ProviderKind,
    /// Carrier code as the aggregator spells it, e.g. `estafeta`.
    pub carrier: String,
    /// Service code, e.g. `ground` or `express`.
    pub service: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    /// Estimated business days in transit.
    pub days: Option<u32>,
    /// Aggregator-side rate id, needed by APIs that buy labels by rate.
    pub rate_id: Option<String>,
    /// Which API generation produced the rate, for aggregators with several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiGeneration>,
}

/// Which Skydropx API produced a rate. Labels are bought with the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiGeneration {
    Pro,
    Legacy,
}

impl ApiGeneration {
    /// Wire name, matching the serde representation.
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Legacy => "legacy",
        }
    }
}

/// Which rate wins when several qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    #[default]
    Cheapest,
    Fastest,
}

impl std::str::FromStr for Preference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cheapest" | "barato" | "economico" => Ok(Self::Cheapest),
            "fastest" | "rapido" | "express" => Ok(Self::Fastest),
            _ => Err(format!("invalid rate preference: {s}")),
        }
    }
}

/// Filters and ordering applied to quoted rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSelector {
    #[serde(default)]
    pub preference: Preference,
    /// Carrier codes to keep; empty keeps all.
    #[serde(default)]
    pub allowed_carriers: Vec<String>,
    /// Drop rates slower than this. Rates without an estimate are kept.
    #[serde(default)]
    pub max_days: Option<u32>,
}

impl RateSelector {
    fn allows(&self, rate: &Rate) -> bool {
        if rate.price <= Decimal::ZERO {
            return false;
        }
        if !self.allowed_carriers.is_empty()
            && !self
                .allowed_carriers
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&rate.carrier))
        {
            return false;
        }
        match (self.max_days, rate.days) {
            (Some(max), Some(days)) => days <= max,
            _ => true,
        }
    }

    /// Filter and sort rates, best first.
    ///
    /// Cheapest sorts by price then days; fastest by days then price. Rates
    /// with unknown transit time sort after those with one.
    #[must_use]
    pub fn rank(&self, rates: Vec<Rate>) -> Vec<Rate> {
        let mut kept: Vec<Rate> = rates.into_iter().filter(|r| self.allows(r)).collect();
        let days_key = |r: &Rate| r.days.unwrap_or(u32::MAX);

        match self.preference {
            Preference::Cheapest => {
                kept.sort_by(|a, b| a.price.cmp(&b.price).then(days_key(a).cmp(&days_key(b))));
            }
            Preference::Fastest => {
                kept.sort_by(|a, b| days_key(a).cmp(&days_key(b)).then(a.price.cmp(&b.price)));
            }
        }
        kept
    }
}

/// Find the rate for a specific carrier and service, ignoring case.
#[must_use]
pub fn find_requested<'a>(rates: &'a [Rate], carrier: &str, service: &str) -> Option<&'a Rate> {
    rates.iter().find(|r| {
        r.carrier.eq_ignore_ascii_case(carrier.trim()) && r.service.eq_ignore_ascii_case(service.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(carrier: &str, service: &str, price: &str, days: Option<u32>) -> Rate {
        Rate {
            provider: ProviderKind::Envia,
            carrier: carrier.to_string(),
            service: service.to_string(),
            description: None,
            price: price.parse().expect("decimal literal"),
            currency: "MXN".to_string(),
            days,
            rate_id: None,
            api: None,
        }
    }

    fn sample() -> Vec<Rate> {
        vec![
            rate("fedex", "express", "310.00", Some(1)),
            rate("estafeta", "ground", "145.50", Some(4)),
            rate("dhl", "express", "289.00", Some(1)),
            rate("redpack", "ecoexpress", "145.50", None),
            rate("paquetexpress", "ground", "0", Some(3)),
        ]
    }

    fn carriers(rates: &[Rate]) -> Vec<&str> {
        rates.iter().map(|r| r.carrier.as_str()).collect()
    }

    #[test]
    fn test_cheapest_orders_by_price_then_days() {
        let ranked = RateSelector::default().rank(sample());
        assert_eq!(carriers(&ranked), ["estafeta", "redpack", "dhl", "fedex"]);
    }

    #[test]
    fn test_fastest_orders_by_days_then_price() {
        let selector = RateSelector {
            preference: Preference::Fastest,
            ..RateSelector::default()
        };
        let ranked = selector.rank(sample());
        assert_eq!(carriers(&ranked), ["dhl", "fedex", "estafeta", "redpack"]);
    }

    #[test]
    fn test_filters_carriers_and_days() {
        let selector = RateSelector {
            preference: Preference::Cheapest,
            allowed_carriers: vec!["DHL".to_string(), "Estafeta".to_string()],
            max_days: Some(2),
        };
        let ranked = selector.rank(sample());
        assert_eq!(carriers(&ranked), ["dhl"]);
    }

    #[test]
    fn test_non_positive_prices_are_dropped() {
        let ranked = RateSelector::default().rank(sample());
        assert!(ranked.iter().all(|r| r.carrier != "paquetexpress"));
    }

    #[test]
    fn test_find_requested_ignores_case() {
        let rates = sample();
        let found = find_requested(&rates, "FedEx", " EXPRESS ").expect("present");
        assert_eq!(found.carrier, "fedex");
        assert!(find_requested(&rates, "ups", "ground").is_none());
    }

    #[test]
    fn test_preference_parse() {
        assert_eq!("rapido".parse::<Preference>(), Ok(Preference::Fastest));
        assert_eq!("Cheapest".parse::<Preference>(), Ok(Preference::Cheapest));
        assert!("whatever".parse::<Preference>().is_err());
    }

    #[test]
    fn test_api_generation_wire_names() {
        let mut rate = rate("estafeta", "standard", "150", Some(3));
        assert!(serde_json::to_value(&rate).expect("json").get("api").is_none());

        rate.api = Some(ApiGeneration::Legacy);
        let json = serde_json::to_value(&rate).expect("json");
        assert_eq!(json["api"], "legacy");
        let back: Rate = serde_json::from_value(json).expect("rate");
        assert_eq!(back.api, Some(ApiGeneration::Legacy));

        assert!(serde_json::from_str::<ApiGeneration>(r#""Pro""#).is_err());
        assert_eq!(
            serde_json::from_str::<ApiGeneration>(r#""pro""#).expect("pro"),
            ApiGeneration::Pro
        );
    }
}
