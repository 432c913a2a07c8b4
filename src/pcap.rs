//! Synthetic PCAP writer: frames CIP/ENIP byte streams as Ethernet II /
//! IPv4 / TCP and serializes to the classic pcap file format.

const LINK_TYPE_ETHERNET: u32 = 1;
const SNAPLEN: u32 = 65535;

const CLIENT_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const SERVER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
const CLIENT_IP: [u8; 4] = [192, 168, 100, 10];
const SERVER_IP: [u8; 4] = [192, 168, 100, 20];
const SERVER_PORT: u16 = 44818;
const BASE_CLIENT_PORT: u16 = 50000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone)]
pub struct FlowState {
    pub client_seq: u32,
    pub server_seq: u32,
    pub client_port: u16,
}

impl FlowState {
    pub fn new(fixture_index: u16) -> Self {
        FlowState {
            client_seq: 1000,
            server_seq: 2000,
            client_port: BASE_CLIENT_PORT + fixture_index,
        }
    }
}

pub struct PcapWriter {
    packets: Vec<Vec<u8>>,
}

impl PcapWriter {
    pub fn new() -> Self {
        PcapWriter { packets: Vec::new() }
    }

    /// Appends one TCP-framed packet and advances the flow's sequence state.
    pub fn push_packet(&mut self, flow: &mut FlowState, direction: Direction, tcp_payload: &[u8]) {
        let frame = build_ethernet_frame(flow, direction, tcp_payload);
        match direction {
            Direction::Request => flow.client_seq += tcp_payload.len() as u32,
            Direction::Response => flow.server_seq += tcp_payload.len() as u32,
        }
        self.packets.push(frame);
    }

    /// Serializes the accumulated packets into a pcap byte stream.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        // Global header: magic, version, thiszone, sigfigs, snaplen, network.
        out.extend_from_slice(&0xA1B2C3D4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&SNAPLEN.to_le_bytes());
        out.extend_from_slice(&LINK_TYPE_ETHERNET.to_le_bytes());

        for (i, packet) in self.packets.iter().enumerate() {
            let ts_sec = i as u32;
            out.extend_from_slice(&ts_sec.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            out.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            out.extend_from_slice(packet);
        }
        out
    }
}

impl Default for PcapWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn build_ethernet_frame(flow: &FlowState, direction: Direction, tcp_payload: &[u8]) -> Vec<u8> {
    let (src_mac, dst_mac, src_ip, dst_ip, src_port, dst_port, seq, ack) = match direction {
        Direction::Request => (
            CLIENT_MAC, SERVER_MAC, CLIENT_IP, SERVER_IP, flow.client_port, SERVER_PORT, flow.client_seq, flow.server_seq,
        ),
        Direction::Response => (
            SERVER_MAC, CLIENT_MAC, SERVER_IP, CLIENT_IP, SERVER_PORT, flow.client_port, flow.server_seq, flow.client_seq,
        ),
    };

    let tcp_segment = build_tcp_segment(src_ip, dst_ip, src_port, dst_port, seq, ack, tcp_payload);
    let ip_packet = build_ipv4_packet(src_ip, dst_ip, &tcp_segment);

    let mut frame = Vec::with_capacity(14 + ip_packet.len());
    frame.extend_from_slice(&dst_mac);
    frame.extend_from_slice(&src_mac);
    frame.extend_from_slice(&0x0800u16.to_be_bytes()); // EtherType: IPv4
    frame.extend_from_slice(&ip_packet);
    frame
}

fn build_tcp_segment(src_ip: [u8; 4], dst_ip: [u8; 4], src_port: u16, dst_port: u16, seq: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
    let mut seg = vec![0u8; 20];
    seg[0..2].copy_from_slice(&src_port.to_be_bytes());
    seg[2..4].copy_from_slice(&dst_port.to_be_bytes());
    seg[4..8].copy_from_slice(&seq.to_be_bytes());
    seg[8..12].copy_from_slice(&ack.to_be_bytes());
    seg[12] = 5 << 4; // data offset: 5 words, no options
    seg[13] = 0x18; // PSH | ACK
    seg[14..16].copy_from_slice(&65535u16.to_be_bytes()); // window
    seg.extend_from_slice(payload);

    let checksum = tcp_checksum(src_ip, dst_ip, &seg);
    seg[16..18].copy_from_slice(&checksum.to_be_bytes());
    seg
}

fn build_ipv4_packet(src_ip: [u8; 4], dst_ip: [u8; 4], tcp_segment: &[u8]) -> Vec<u8> {
    let total_len = 20 + tcp_segment.len();
    let mut packet = vec![0u8; 20];
    packet[0] = 0x45; // version 4, IHL 5
    packet[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    packet[6] = 0x40; // don't fragment
    packet[8] = 64; // TTL
    packet[9] = 6; // protocol: TCP
    packet[12..16].copy_from_slice(&src_ip);
    packet[16..20].copy_from_slice(&dst_ip);

    let checksum = ipv4_checksum(&packet);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());

    packet.extend_from_slice(tcp_segment);
    packet
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    checksum16(header)
}

fn tcp_checksum(src_ip: [u8; 4], dst_ip: [u8; 4], tcp_segment: &[u8]) -> u16 {
    let mut pseudo = Vec::with_capacity(12 + tcp_segment.len());
    pseudo.extend_from_slice(&src_ip);
    pseudo.extend_from_slice(&dst_ip);
    pseudo.push(0);
    pseudo.push(6); // protocol: TCP
    pseudo.extend_from_slice(&(tcp_segment.len() as u16).to_be_bytes());
    pseudo.extend_from_slice(tcp_segment);
    checksum16(&pseudo)
}

fn checksum16(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_sequence_numbers_advance_per_direction() {
        let mut flow = FlowState::new(0);
        let mut pcap = PcapWriter::new();
        pcap.push_packet(&mut flow, Direction::Request, &[1, 2, 3, 4]);
        assert_eq!(flow.client_seq, 1004);
        pcap.push_packet(&mut flow, Direction::Response, &[1, 2]);
        assert_eq!(flow.server_seq, 2002);
    }

    #[test]
    fn finish_emits_a_valid_pcap_global_header() {
        let mut pcap = PcapWriter::new();
        let mut flow = FlowState::new(1);
        pcap.push_packet(&mut flow, Direction::Request, &[0xAA]);
        let bytes = pcap.finish();
        assert_eq!(&bytes[0..4], &0xA1B2C3D4u32.to_le_bytes());
        assert!(bytes.len() > 24);
    }
}
