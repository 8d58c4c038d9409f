use crate::wire::arp::ArpMessage;
use crate::wire::ethernet::{EthernetFrame, EthernetHeader, MacAddress};
use crate::wire::ipv4::Ipv4Datagram;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;
use tracing::{debug, trace};

/// How long a learned IP-to-MAC mapping stays valid.
const ARP_ENTRY_TTL_MS: u64 = 30_000;

/// Minimum spacing between ARP requests for the same destination.
const ARP_REQUEST_INTERVAL_MS: u64 = 5_000;

/// The physical output port where the interface sends Ethernet frames.
///
/// The host must not re-enter the interface from inside `transmit`.
pub trait OutputPort {
    fn transmit(&mut self, sender: &NetworkInterface, frame: &EthernetFrame);
}

#[derive(Debug, Clone, Copy)]
struct ArpEntry {
    mac: MacAddress,
    learned_at_ms: u64,
}

/// Connects the internet layer with the link layer: encapsulates datagrams
/// into Ethernet frames, resolving next-hop MAC addresses over ARP.
///
/// Datagrams headed for an unresolved address queue up per destination and
/// flush, in order, as soon as a reply (or any ARP traffic from that
/// address) teaches the mapping. The same type serves as one port of a
/// router, which drains `datagrams_received` instead of a TCP stack.
pub struct NetworkInterface {
    name: String,
    port: Rc<RefCell<dyn OutputPort>>,
    mac: MacAddress,
    ip: Ipv4Addr,
    now_ms: u64,
    arp_cache: FxHashMap<Ipv4Addr, ArpEntry>,
    pending: FxHashMap<Ipv4Addr, VecDeque<Ipv4Datagram>>,
    last_request_ms: FxHashMap<Ipv4Addr, u64>,
    received: VecDeque<Ipv4Datagram>,
}

impl NetworkInterface {
    pub fn new(
        name: impl Into<String>,
        port: Rc<RefCell<dyn OutputPort>>,
        mac: MacAddress,
        ip: Ipv4Addr,
    ) -> Self {
        let name = name.into();
        debug!(iface = %name, %mac, %ip, "network interface up");
        NetworkInterface {
            name,
            port,
            mac,
            ip,
            now_ms: 0,
            arp_cache: FxHashMap::default(),
            pending: FxHashMap::default(),
            last_request_ms: FxHashMap::default(),
            received: VecDeque::new(),
        }
    }

    /// Send a datagram toward `next_hop`, encapsulated in an Ethernet frame.
    /// If the next hop's MAC is unknown, queue the datagram and ask for it.
    pub fn send_datagram(&mut self, dgram: Ipv4Datagram, next_hop: Ipv4Addr) {
        if let Some(mac) = self.resolved_mac(next_hop) {
            let frame = self.encapsulate_ipv4(&dgram, mac);
            self.emit(frame);
            return;
        }

        self.pending.entry(next_hop).or_default().push_back(dgram);

        let recently_asked = self
            .last_request_ms
            .get(&next_hop)
            .is_some_and(|&sent| self.now_ms - sent < ARP_REQUEST_INTERVAL_MS);
        if recently_asked {
            return;
        }
        self.last_request_ms.insert(next_hop, self.now_ms);

        let request = ArpMessage::request(self.mac, self.ip, next_hop);
        let frame = EthernetFrame {
            header: EthernetHeader {
                dst: MacAddress::BROADCAST,
                src: self.mac,
                ethertype: EthernetHeader::TYPE_ARP,
            },
            payload: request.to_bytes(),
        };
        trace!(iface = %self.name, dst = %next_hop, "sending ARP request");
        self.emit(frame);
    }

    /// Accept one Ethernet frame. Datagrams for us land on the received
    /// queue; ARP traffic teaches mappings and may trigger a reply.
    pub fn recv_frame(&mut self, frame: &EthernetFrame) {
        let header = &frame.header;
        if header.dst != self.mac && !header.dst.is_broadcast() {
            return;
        }

        match header.ethertype {
            EthernetHeader::TYPE_IPV4 => {
                // Unparseable datagrams are dropped without a trace
                if let Ok(dgram) = Ipv4Datagram::parse(&frame.payload) {
                    self.received.push_back(dgram);
                }
            }
            EthernetHeader::TYPE_ARP => {
                if let Ok(arp) = ArpMessage::parse(&frame.payload) {
                    self.recv_arp(&arp);
                }
            }
            _ => {}
        }
    }

    /// Advance virtual time. Cache expiry is evaluated lazily on lookup.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.now_ms += ms_since_last_tick;
    }

    /// Datagrams received and not yet claimed by the layer above
    pub fn datagrams_received(&mut self) -> &mut VecDeque<Ipv4Datagram> {
        &mut self.received
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac_address(&self) -> MacAddress {
        self.mac
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.ip
    }

    fn recv_arp(&mut self, arp: &ArpMessage) {
        if arp.opcode == ArpMessage::OPCODE_REQUEST && arp.target_ip == self.ip {
            let reply = ArpMessage::reply(self.mac, self.ip, arp.sender_mac, arp.sender_ip);
            let frame = EthernetFrame {
                header: EthernetHeader {
                    dst: arp.sender_mac,
                    src: self.mac,
                    ethertype: EthernetHeader::TYPE_ARP,
                },
                payload: reply.to_bytes(),
            };
            self.emit(frame);
        }

        // Requests and replies both teach the sender's mapping
        trace!(iface = %self.name, ip = %arp.sender_ip, mac = %arp.sender_mac, "learned ARP mapping");
        self.arp_cache.insert(
            arp.sender_ip,
            ArpEntry {
                mac: arp.sender_mac,
                learned_at_ms: self.now_ms,
            },
        );

        if let Some(queue) = self.pending.remove(&arp.sender_ip) {
            for dgram in queue {
                let frame = self.encapsulate_ipv4(&dgram, arp.sender_mac);
                self.emit(frame);
            }
        }
    }

    fn resolved_mac(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        let entry = self.arp_cache.get(&ip)?;
        if self.now_ms - entry.learned_at_ms < ARP_ENTRY_TTL_MS {
            Some(entry.mac)
        } else {
            None
        }
    }

    fn encapsulate_ipv4(&self, dgram: &Ipv4Datagram, dst: MacAddress) -> EthernetFrame {
        // Serialization of an in-memory datagram cannot fail
        let payload = dgram.serialize().unwrap_or_default();
        EthernetFrame {
            header: EthernetHeader {
                dst,
                src: self.mac,
                ethertype: EthernetHeader::TYPE_IPV4,
            },
            payload,
        }
    }

    fn emit(&self, frame: EthernetFrame) {
        let port = Rc::clone(&self.port);
        port.borrow_mut().transmit(self, &frame);
    }
}

impl std::fmt::Debug for NetworkInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkInterface")
            .field("name", &self.name)
            .field("mac", &self.mac)
            .field("ip", &self.ip)
            .field("now_ms", &self.now_ms)
            .field("arp_cache", &self.arp_cache)
            .field("received", &self.received.len())
            .finish()
    }
}

// -- Unit tests --
