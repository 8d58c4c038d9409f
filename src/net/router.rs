use crate::net::interface::NetworkInterface;
use crate::wire::ipv4::Ipv4Datagram;
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Route {
    prefix: Ipv4Addr,
    prefix_len: u8,
    next_hop: Option<Ipv4Addr>,
    interface_index: usize,
}

impl Route {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        if self.prefix_len == 0 {
            return true;
        }
        let shift = 32 - self.prefix_len as u32;
        u32::from(addr) >> shift == u32::from(self.prefix) >> shift
    }
}

/// Forwards datagrams between network interfaces by longest-prefix match.
///
/// Interfaces are shared: the router drains their received queues during
/// `route`, while the host remains free to poll or feed them directly.
#[derive(Debug, Default)]
pub struct Router {
    interfaces: Vec<Rc<RefCell<NetworkInterface>>>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    /// Register an interface and return its index
    pub fn add_interface(&mut self, interface: Rc<RefCell<NetworkInterface>>) -> usize {
        self.interfaces.push(interface);
        self.interfaces.len() - 1
    }

    /// A registered interface, for external polling
    pub fn interface(&self, index: usize) -> &Rc<RefCell<NetworkInterface>> {
        &self.interfaces[index]
    }

    /// Append a route. `next_hop` is absent for directly attached networks,
    /// in which case datagrams travel straight to their destination address.
    pub fn add_route(
        &mut self,
        prefix: Ipv4Addr,
        prefix_len: u8,
        next_hop: Option<Ipv4Addr>,
        interface_index: usize,
    ) {
        assert!(prefix_len <= 32, "prefix length {prefix_len} out of range");
        assert!(
            interface_index < self.interfaces.len(),
            "no interface {interface_index}"
        );

        debug!(
            prefix = %prefix,
            prefix_len,
            next_hop = ?next_hop,
            interface = interface_index,
            "adding route"
        );
        self.routes.push(Route {
            prefix,
            prefix_len,
            next_hop,
            interface_index,
        });
    }

    /// Drain every interface's received queue and forward each datagram out
    /// the best-matching route, decrementing its TTL
    pub fn route(&mut self) {
        for interface in &self.interfaces {
            loop {
                let dgram = interface.borrow_mut().datagrams_received().pop_front();
                let Some(mut dgram) = dgram else {
                    break;
                };

                dgram.header.ttl = dgram.header.ttl.saturating_sub(1);
                dgram.header.recompute_checksum();
                if dgram.header.ttl == 0 {
                    continue;
                }
                self.forward(dgram);
            }
        }
    }

    fn forward(&self, dgram: Ipv4Datagram) {
        let dst = dgram.header.dst_ip;

        // Most-specific match wins; among equals, the one added last
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if route.matches(dst) && best.map_or(true, |b| route.prefix_len >= b.prefix_len) {
                best = Some(route);
            }
        }

        if let Some(route) = best {
            let next_hop = route.next_hop.unwrap_or(dst);
            self.interfaces[route.interface_index]
                .borrow_mut()
                .send_datagram(dgram, next_hop);
        }
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::interface::OutputPort;
    use crate::wire::arp::ArpMessage;
    use crate::wire::ethernet::{EthernetFrame, EthernetHeader, MacAddress};

    /// Captures every transmitted frame.
    #[derive(Default)]
    struct FrameLog {
        frames: Vec<EthernetFrame>,
    }

    impl OutputPort for FrameLog {
        fn transmit(&mut self, _sender: &NetworkInterface, frame: &EthernetFrame) {
            self.frames.push(frame.clone());
        }
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    struct TestNet {
        router: Router,
        ports: Vec<Rc<RefCell<FrameLog>>>,
    }

    /// Three-armed router: a default route via 172.16.0.100, a directly
    /// attached 10.0.0.0/8, and 10.1.0.0/16 via 10.0.99.1.
    fn create_test_net() -> TestNet {
        let mut router = Router::new();
        let mut ports = Vec::new();

        for (i, addr) in ["172.16.0.1", "10.0.0.1", "10.0.99.2"].iter().enumerate() {
            let port = Rc::new(RefCell::new(FrameLog::default()));
            let iface = NetworkInterface::new(
                format!("if{i}"),
                port.clone(),
                MacAddress::from([0x02, 0, 0, 0, 0, i as u8]),
                ip(addr),
            );
            ports.push(port);
            router.add_interface(Rc::new(RefCell::new(iface)));
        }

        router.add_route(ip("0.0.0.0"), 0, Some(ip("172.16.0.100")), 0);
        router.add_route(ip("10.0.0.0"), 8, None, 1);
        router.add_route(ip("10.1.0.0"), 16, Some(ip("10.0.99.1")), 2);

        TestNet { router, ports }
    }

    fn datagram(dst: Ipv4Addr, ttl: u8) -> Ipv4Datagram {
        let mut dgram = Ipv4Datagram::new(ip("192.168.5.5"), dst, b"payload".to_vec());
        dgram.header.ttl = ttl;
        dgram.header.recompute_checksum();
        dgram
    }

    fn inject(net: &mut TestNet, iface: usize, dgram: Ipv4Datagram) {
        net.router
            .interface(iface)
            .borrow_mut()
            .datagrams_received()
            .push_back(dgram);
    }

    /// The ARP request an unresolved forward emits names the chosen next hop.
    fn arp_target(port: &Rc<RefCell<FrameLog>>) -> Ipv4Addr {
        let log = port.borrow();
        let request = ArpMessage::parse(&log.frames.last().unwrap().payload).unwrap();
        request.target_ip
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut net = create_test_net();

        inject(&mut net, 0, datagram(ip("10.1.2.3"), 2));
        net.router.route();

        // /16 beats /8 and the default: out if2, toward the gateway
        assert!(net.ports[0].borrow().frames.is_empty());
        assert!(net.ports[1].borrow().frames.is_empty());
        assert_eq!(arp_target(&net.ports[2]), ip("10.0.99.1"));
    }

    #[test]
    fn test_direct_route_targets_destination() {
        let mut net = create_test_net();

        inject(&mut net, 0, datagram(ip("10.2.0.5"), 2));
        net.router.route();

        // /8 direct: the next hop is the destination itself
        assert_eq!(arp_target(&net.ports[1]), ip("10.2.0.5"));
    }

    #[test]
    fn test_default_route_catches_everything_else() {
        let mut net = create_test_net();

        inject(&mut net, 1, datagram(ip("8.8.8.8"), 2));
        net.router.route();

        assert_eq!(arp_target(&net.ports[0]), ip("172.16.0.100"));
    }

    #[test]
    fn test_ttl_decremented_and_checksum_fresh() {
        let mut net = create_test_net();

        inject(&mut net, 0, datagram(ip("10.1.2.3"), 2));
        net.router.route();

        // Resolve ARP so the datagram itself leaves
        let gateway_mac = MacAddress::from([0xee; 6]);
        let reply = ArpMessage::reply(
            gateway_mac,
            ip("10.0.99.1"),
            net.router.interface(2).borrow().mac_address(),
            ip("10.0.99.2"),
        );
        let iface_mac = net.router.interface(2).borrow().mac_address();
        net.router.interface(2).borrow_mut().recv_frame(&EthernetFrame {
            header: EthernetHeader {
                dst: iface_mac,
                src: gateway_mac,
                ethertype: EthernetHeader::TYPE_ARP,
            },
            payload: reply.to_bytes(),
        });

        let frames = net.ports[2].borrow().frames.clone();
        let sent = frames
            .iter()
            .find(|f| f.header.ethertype == EthernetHeader::TYPE_IPV4)
            .expect("datagram frame after ARP resolution");

        // A valid checksum is a parse precondition, so this also checks it
        let dgram = Ipv4Datagram::parse(&sent.payload).unwrap();
        assert_eq!(dgram.header.ttl, 1);
        assert_eq!(dgram.header.dst_ip, ip("10.1.2.3"));
    }

    #[test]
    fn test_expired_ttl_dropped() {
        let mut net = create_test_net();

        inject(&mut net, 0, datagram(ip("10.1.2.3"), 1));
        inject(&mut net, 0, datagram(ip("10.1.2.3"), 0));
        net.router.route();

        for port in &net.ports {
            assert!(port.borrow().frames.is_empty());
        }
    }

    #[test]
    fn test_no_matching_route_drops() {
        let mut router = Router::new();
        let port = Rc::new(RefCell::new(FrameLog::default()));
        let iface = NetworkInterface::new(
            "if0",
            port.clone(),
            MacAddress::from([0x02; 6]),
            ip("10.0.0.1"),
        );
        router.add_interface(Rc::new(RefCell::new(iface)));
        router.add_route(ip("10.0.0.0"), 8, None, 0);

        router
            .interface(0)
            .borrow_mut()
            .datagrams_received()
            .push_back(datagram(ip("192.168.1.1"), 5));
        router.route();

        assert!(port.borrow().frames.is_empty());
    }

    #[test]
    fn test_tie_breaks_to_last_added_route() {
        let mut router = Router::new();
        let mut ports = Vec::new();
        for i in 0..2u8 {
            let port = Rc::new(RefCell::new(FrameLog::default()));
            let iface = NetworkInterface::new(
                format!("if{i}"),
                port.clone(),
                MacAddress::from([0x02, 0, 0, 0, 0, i]),
                ip("10.0.0.1"),
            );
            ports.push(port);
            router.add_interface(Rc::new(RefCell::new(iface)));
        }
        router.add_route(ip("10.0.0.0"), 8, None, 0);
        router.add_route(ip("10.0.0.0"), 8, None, 1);

        router
            .interface(0)
            .borrow_mut()
            .datagrams_received()
            .push_back(datagram(ip("10.5.5.5"), 3));
        router.route();

        assert!(ports[0].borrow().frames.is_empty());
        assert_eq!(ports[1].borrow().frames.len(), 1);
    }

    #[test]
    #[should_panic(expected = "prefix length")]
    fn test_rejects_invalid_prefix_length() {
        let mut router = Router::new();
        let port = Rc::new(RefCell::new(FrameLog::default()));
        let iface =
            NetworkInterface::new("if0", port, MacAddress::from([0x02; 6]), ip("10.0.0.1"));
        router.add_interface(Rc::new(RefCell::new(iface)));
        router.add_route(ip("10.0.0.0"), 33, None, 0);
    }
}
