//! Data types for addresses to nodes in DICOM networks.
//!
//! This module provides the definitions for [`FullAeAddr`] and [`AeAddr`],
//! which couple a socket address with an application entity (AE) title.
//! The textual syntax is `«ae_title»@«network_address»:«port»`,
//! which works with IPv4 and IPv6 addresses as well as domain names.
use std::{
    convert::TryFrom,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use snafu::{ensure, Backtrace, Snafu};

/// Could not parse an AE address.
#[derive(Debug, Snafu)]
#[snafu(display("Could not parse AE address: missing `@` separator"))]
pub struct ParseAeAddressError {
    backtrace: Backtrace,
}

/// A full address to a target application entity:
/// an AE title plus a socket address.
///
/// For the version without a mandatory AE title,
/// see [`AeAddr`].
///
/// # Example
///
/// ```
/// # use dimse_ul::FullAeAddr;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: FullAeAddr<String> = "HOROS@192.168.1.99:2763".parse()?;
/// assert_eq!(addr.ae_title(), "HOROS");
/// assert_eq!(addr.socket_addr(), "192.168.1.99:2763");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FullAeAddr<T> {
    ae_title: String,
    socket_addr: T,
}

impl<T> FullAeAddr<T> {
    /// Create an AE address from its constituent parts.
    pub fn new(ae_title: impl Into<String>, socket_addr: T) -> Self {
        FullAeAddr {
            ae_title: ae_title.into(),
            socket_addr,
        }
    }

    /// Retrieve the AE title part.
    pub fn ae_title(&self) -> &str {
        &self.ae_title
    }

    /// Retrieve the socket address part.
    pub fn socket_addr(&self) -> &T {
        &self.socket_addr
    }

    /// Convert into its constituent parts.
    pub fn into_parts(self) -> (String, T) {
        (self.ae_title, self.socket_addr)
    }
}

impl<T> From<(String, T)> for FullAeAddr<T> {
    fn from((ae_title, socket_addr): (String, T)) -> Self {
        FullAeAddr::new(ae_title, socket_addr)
    }
}

impl<T> FromStr for FullAeAddr<T>
where
    T: FromStr,
{
    type Err = ParseAeAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ae_title, addr) = match s.split_once('@') {
            Some(parts) => parts,
            None => return ParseAeAddressSnafu.fail(),
        };
        ensure!(!ae_title.is_empty(), ParseAeAddressSnafu);
        let socket_addr = match addr.parse() {
            Ok(addr) => addr,
            Err(_) => return ParseAeAddressSnafu.fail(),
        };
        Ok(FullAeAddr::new(ae_title, socket_addr))
    }
}

impl<T> std::fmt::Display for FullAeAddr<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.ae_title, self.socket_addr)
    }
}

impl ToSocketAddrs for FullAeAddr<String> {
    type Iter = std::vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        Ok(self.socket_addr.to_socket_addrs()?.collect::<Vec<_>>().into_iter())
    }
}

impl ToSocketAddrs for FullAeAddr<SocketAddr> {
    type Iter = std::option::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        self.socket_addr.to_socket_addrs()
    }
}

/// A compound address to a target application entity,
/// in which the AE title is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct AeAddr<T> {
    ae_title: Option<String>,
    socket_addr: T,
}

impl<T> AeAddr<T> {
    /// Create an AE address with an AE title.
    pub fn new(ae_title: impl Into<String>, socket_addr: T) -> Self {
        AeAddr {
            ae_title: Some(ae_title.into()),
            socket_addr,
        }
    }

    /// Create an AE address without an AE title.
    pub fn new_socket_addr(socket_addr: T) -> Self {
        AeAddr {
            ae_title: None,
            socket_addr,
        }
    }

    /// Retrieve the AE title part, if present.
    pub fn ae_title(&self) -> Option<&str> {
        self.ae_title.as_deref()
    }

    /// Retrieve the socket address part.
    pub fn socket_addr(&self) -> &T {
        &self.socket_addr
    }
}

impl<T> From<FullAeAddr<T>> for AeAddr<T> {
    fn from(full: FullAeAddr<T>) -> Self {
        AeAddr {
            ae_title: Some(full.ae_title),
            socket_addr: full.socket_addr,
        }
    }
}

impl<'a> TryFrom<&'a str> for AeAddr<&'a str> {
    type Error = ParseAeAddressError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        match value.split_once('@') {
            Some((ae_title, addr)) if !ae_title.is_empty() => Ok(AeAddr {
                ae_title: Some(ae_title.to_string()),
                socket_addr: addr,
            }),
            _ => ParseAeAddressSnafu.fail(),
        }
    }
}

impl<T> ToSocketAddrs for AeAddr<T>
where
    T: ToSocketAddrs,
{
    type Iter = T::Iter;

    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        self.socket_addr.to_socket_addrs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_ae_addr() {
        let addr: FullAeAddr<String> = "HOROS@localhost:2763".parse().unwrap();
        assert_eq!(addr.ae_title(), "HOROS");
        assert_eq!(addr.socket_addr(), "localhost:2763");
        assert_eq!(addr.to_string(), "HOROS@localhost:2763");

        let addr: FullAeAddr<SocketAddr> = "STORE-SCP@127.0.0.1:104".parse().unwrap();
        assert_eq!(addr.ae_title(), "STORE-SCP");
        assert_eq!(addr.socket_addr(), &SocketAddr::from(([127, 0, 0, 1], 104)));
    }

    #[test]
    fn parse_rejects_missing_ae_title() {
        assert!("localhost:104".parse::<FullAeAddr<String>>().is_err());
        assert!("@localhost:104".parse::<FullAeAddr<String>>().is_err());
        assert!(AeAddr::try_from("localhost:104").is_err());
    }

    #[test]
    fn ae_addr_without_title() {
        let addr = AeAddr::new_socket_addr("127.0.0.1:11112");
        assert_eq!(addr.ae_title(), None);
        assert_eq!(*addr.socket_addr(), "127.0.0.1:11112");
    }
}
