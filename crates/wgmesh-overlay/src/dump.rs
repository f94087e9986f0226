//! Parsers for `wg show <iface> dump` and `ip -j addr show` output

use crate::config::{DevicePeer, DeviceState};
use crate::error::{OverlayError, Result};
use crate::keys::WgKey;
use ipnet::IpNet;
use serde::Deserialize;
use std::net::IpAddr;

/// Parse the tab-separated output of `wg show <iface> dump`.
///
/// The first line describes the interface:
/// `private-key public-key listen-port fwmark`. Each following line is a
/// peer: `public-key preshared-key endpoint allowed-ips latest-handshake
/// transfer-rx transfer-tx persistent-keepalive`. Unset values are printed
/// as `(none)`.
pub fn parse_wg_dump(name: &str, output: &str) -> Result<DeviceState> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| OverlayError::Parse(format!("empty dump for interface {name}")))?;
    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() < 3 {
        return Err(OverlayError::Parse(format!(
            "interface line has {} fields, expected at least 3",
            fields.len()
        )));
    }

    let mut state = DeviceState {
        name: name.to_string(),
        private_key: optional_key(fields[0])?,
        public_key: optional_key(fields[1])?,
        listen_port: fields[2]
            .parse()
            .map_err(|e| OverlayError::Parse(format!("listen port {:?}: {e}", fields[2])))?,
        peers: Vec::new(),
    };

    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(OverlayError::Parse(format!(
                "peer line has {} fields, expected at least 5",
                fields.len()
            )));
        }

        let public_key: WgKey = fields[0].parse()?;
        let endpoint = match fields[2] {
            "(none)" => None,
            ep => ep.parse().ok(),
        };
        let allowed_ips = match fields[3] {
            "(none)" | "" => Vec::new(),
            list => list
                .split(',')
                .filter_map(|cidr| cidr.trim().parse::<IpNet>().ok())
                .collect(),
        };
        let last_handshake = fields[4].parse::<u64>().ok().filter(|t| *t > 0);

        state.peers.push(DevicePeer {
            public_key,
            endpoint,
            allowed_ips,
            last_handshake,
        });
    }

    Ok(state)
}

fn optional_key(field: &str) -> Result<Option<WgKey>> {
    match field {
        "(none)" | "" => Ok(None),
        key => key.parse().map(Some),
    }
}

#[derive(Debug, Deserialize)]
struct IpLink {
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    local: IpAddr,
    prefixlen: u8,
}

/// Parse the JSON output of `ip -j addr show dev <iface>`
pub fn parse_ip_addr_json(output: &str) -> Result<Vec<IpNet>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    let links: Vec<IpLink> = serde_json::from_str(output)?;
    links
        .into_iter()
        .flat_map(|link| link.addr_info)
        .map(|info| {
            IpNet::new(info.local, info.prefixlen)
                .map_err(|e| OverlayError::InvalidCidr(format!("{}/{}: {e}", info.local, info.prefixlen)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> WgKey {
        WgKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_parse_fresh_device() {
        let dump = "(none)\t(none)\t0\toff\n";
        let state = parse_wg_dump("wga", dump).unwrap();
        assert_eq!(state.name, "wga");
        assert!(state.private_key.is_none());
        assert!(state.public_key.is_none());
        assert_eq!(state.listen_port, 0);
        assert!(state.peers.is_empty());
    }

    #[test]
    fn test_parse_device_with_peers() {
        let dump = format!(
            "{}\t{}\t51821\toff\n\
             {}\t(none)\t10.0.0.5:51820\t100.255.0.0/16\t1700000000\t1024\t2048\toff\n\
             {}\t(none)\t(none)\t100.255.1.2/32,10.244.1.0/24\t0\t0\t0\t25\n",
            key(1),
            key(2),
            key(3),
            key(4),
        );

        let state = parse_wg_dump("wga", &dump).unwrap();
        assert_eq!(state.private_key, Some(key(1)));
        assert_eq!(state.public_key, Some(key(2)));
        assert_eq!(state.listen_port, 51821);
        assert_eq!(state.peers.len(), 2);

        let first = &state.peers[0];
        assert_eq!(first.public_key, key(3));
        assert_eq!(first.endpoint, Some("10.0.0.5:51820".parse().unwrap()));
        assert_eq!(first.allowed_ips, vec!["100.255.0.0/16".parse::<IpNet>().unwrap()]);
        assert_eq!(first.last_handshake, Some(1_700_000_000));

        let second = &state.peers[1];
        assert_eq!(second.endpoint, None);
        assert_eq!(second.allowed_ips.len(), 2);
        assert_eq!(second.last_handshake, None);
    }

    #[test]
    fn test_parse_empty_dump_fails() {
        assert!(parse_wg_dump("wga", "").is_err());
    }

    #[test]
    fn test_parse_ip_addr_json() {
        let json = r#"[{"ifindex":7,"ifname":"wga","flags":["POINTOPOINT","NOARP","UP","LOWER_UP"],
            "mtu":1420,"qdisc":"noqueue","operstate":"UNKNOWN","group":"default","txqlen":1000,
            "link_type":"none","addr_info":[{"family":"inet","local":"100.255.3.7","prefixlen":16,
            "scope":"global","label":"wga","valid_life_time":4294967295,"preferred_life_time":4294967295}]}]"#;

        let addrs = parse_ip_addr_json(json).unwrap();
        assert_eq!(addrs, vec!["100.255.3.7/16".parse::<IpNet>().unwrap()]);
    }

    #[test]
    fn test_parse_ip_addr_json_no_addresses() {
        let json = r#"[{"ifindex":7,"ifname":"wga","addr_info":[]}]"#;
        assert!(parse_ip_addr_json(json).unwrap().is_empty());
        assert!(parse_ip_addr_json("").unwrap().is_empty());
    }
}
