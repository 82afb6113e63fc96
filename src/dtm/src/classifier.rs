use std::net::Ipv4Addr;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;

/// Extracts the IPv4 destination address from a raw Ethernet frame, the only
/// thing the reactive decision path needs from a packet-in. A single 802.1Q
/// tag is skipped; anything that is not IPv4 yields `None`.
pub fn ipv4_dst(frame: &[u8]) -> Option<Ipv4Addr> {
    if frame.len() < 14 {
        return None;
    }
    let mut offset = 12;
    let mut ethertype = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
    offset += 2;
    if ethertype == ETHERTYPE_VLAN {
        if frame.len() < offset + 4 {
            return None;
        }
        ethertype = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]);
        offset += 4;
    }
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }
    // destination address sits at bytes 16..20 of the IPv4 header
    if frame.len() < offset + 20 {
        return None;
    }
    Some(Ipv4Addr::new(
        frame[offset + 16],
        frame[offset + 17],
        frame[offset + 18],
        frame[offset + 19],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn ipv4_frame(dst: Ipv4Addr) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = 17; // UDP
        ip[12..16].copy_from_slice(&[192, 168, 0, 1]);
        ip[16..20].copy_from_slice(&dst.octets());
        frame.extend_from_slice(&ip);
        frame.extend_from_slice(&[0u8; 8]); // UDP header
        frame
    }

    #[test]
    fn extracts_destination_from_ipv4_frame() {
        let dst: Ipv4Addr = "10.10.1.100".parse().unwrap();
        assert_eq!(ipv4_dst(&ipv4_frame(dst)), Some(dst));
    }

    #[test]
    fn skips_vlan_tag() {
        let dst: Ipv4Addr = "10.10.2.100".parse().unwrap();
        let inner = ipv4_frame(dst);
        let mut frame = inner[..12].to_vec();
        frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x64]); // vlan 100
        frame.extend_from_slice(&inner[12..]);
        assert_eq!(ipv4_dst(&frame), Some(dst));
    }

    #[test]
    fn ignores_non_ipv4() {
        let mut arp = vec![0u8; 42];
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert_eq!(ipv4_dst(&arp), None);
    }

    #[test]
    fn ignores_truncated_frames() {
        let dst: Ipv4Addr = "10.10.1.100".parse().unwrap();
        let frame = ipv4_frame(dst);
        assert_eq!(ipv4_dst(&frame[..20]), None);
        assert_eq!(ipv4_dst(&[]), None);
    }
}
