use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Broker backend types
///
/// Selected through `BROKER_BACKEND`. The in-memory backend only connects tasks that
/// live in the same process and keeps every record for the life of the process, so
/// configuration refuses it unless `ENVIRONMENT=test`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    Kafka,
    Memory,
}

impl FromStr for BrokerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kafka" => Ok(BrokerBackend::Kafka),
            "memory" => Ok(BrokerBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid broker backend: {}", s)),
        }
    }
}

impl Display for BrokerBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BrokerBackend::Kafka => write!(f, "kafka"),
            BrokerBackend::Memory => write!(f, "memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Kafka".parse::<BrokerBackend>().unwrap(), BrokerBackend::Kafka);
        assert_eq!("memory".parse::<BrokerBackend>().unwrap(), BrokerBackend::Memory);
        assert!("rabbit".parse::<BrokerBackend>().is_err());
    }
}
