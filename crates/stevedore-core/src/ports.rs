//! Container port strings (`8080`, `8080/TCP`, `53/udp`)

use std::fmt;

use crate::error::{CoreError, Result};

/// Transport protocol of an exposed port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Kubernetes spelling (`TCP` / `UDP`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed port declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub number: i32,
    pub protocol: Protocol,
}

impl PortSpec {
    /// Parse `<number>[/<protocol>]`, protocol defaults to TCP
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidPort {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let splits: Vec<&str> = input.split('/').collect();
        let (number, protocol) = match splits.as_slice() {
            [number] => (*number, Protocol::Tcp),
            [number, proto] => {
                let protocol = match proto.to_ascii_uppercase().as_str() {
                    "TCP" => Protocol::Tcp,
                    "UDP" => Protocol::Udp,
                    _ => return Err(invalid("invalid port protocol")),
                };
                (*number, protocol)
            }
            _ => return Err(invalid("expected <number>[/<protocol>]")),
        };

        let number: i32 = number
            .parse()
            .map_err(|_| invalid("invalid port number"))?;

        Ok(Self { number, protocol })
    }

    /// Parse a list of port strings
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Self>> {
        inputs.iter().map(|p| Self::parse(p.as_ref())).collect()
    }

    /// Port name as used on the container, e.g. `8080-tcp`
    pub fn name(&self) -> String {
        format!(
            "{}-{}",
            self.number,
            self.protocol.as_str().to_ascii_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_protocol() {
        let port = PortSpec::parse("8080").unwrap();
        assert_eq!(port.number, 8080);
        assert_eq!(port.protocol, Protocol::Tcp);
        assert_eq!(port.name(), "8080-tcp");
    }

    #[test]
    fn test_parse_udp_case_insensitive() {
        let port = PortSpec::parse("53/udp").unwrap();
        assert_eq!(port.protocol, Protocol::Udp);
        assert_eq!(port.name(), "53-udp");
    }

    #[test]
    fn test_parse_errors() {
        assert!(PortSpec::parse("abc").is_err());
        assert!(PortSpec::parse("80/SCTP").is_err());
        assert!(PortSpec::parse("80/tcp/x").is_err());
    }

    #[test]
    fn test_parse_all_stops_on_error() {
        assert_eq!(PortSpec::parse_all(&["80", "443/TCP"]).unwrap().len(), 2);
        assert!(PortSpec::parse_all(&["80", "nope"]).is_err());
    }
}
