//! Shared test harness: a deterministic in-memory kernel for one link
//! endpoint, with a scripted router side, a recording transport and a
//! wake-up queue standing in for the self-timed output link.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use flitlink::{
    Bandwidth, CreditMessage, LinkConfig, LinkEndpoint, LinkMessage, OutputTimer, Packet,
    RouterPort, SetupMessage, SetupReceiver, SetupSender, SimClock, SimTime, TimeSource, VnId,
};

/// Router-side double: records everything the endpoint transmits and
/// serves scripted setup-phase replies.
pub struct TestRouter {
    clock: Rc<SimClock>,
    sent: Rc<RefCell<Vec<(SimTime, LinkMessage)>>>,
    setup_sent: Rc<RefCell<Vec<LinkMessage>>>,
    setup_pending: Rc<RefCell<VecDeque<LinkMessage>>>,
}

impl SetupSender for TestRouter {
    fn send_setup(&mut self, msg: LinkMessage) {
        self.setup_sent.borrow_mut().push(msg);
    }
}

impl SetupReceiver for TestRouter {
    fn recv_setup(&mut self) -> Option<LinkMessage> {
        self.setup_pending.borrow_mut().pop_front()
    }
}

impl RouterPort for TestRouter {
    fn send(&mut self, msg: LinkMessage) {
        self.sent.borrow_mut().push((self.clock.now(), msg));
    }
}

/// Output-timer double: converts wake requests into absolute timestamps.
/// Wake-ups cannot be cancelled, so stale entries stay queued.
pub struct TestTimer {
    clock: Rc<SimClock>,
    period: Rc<Cell<SimTime>>,
    wakes: Rc<RefCell<BTreeMap<SimTime, u64>>>,
}

impl OutputTimer for TestTimer {
    fn set_period(&mut self, period: SimTime) {
        self.period.set(period);
    }

    fn wake_after(&mut self, cycles: u64) {
        let at = self.clock.now() + cycles * self.period.get();
        *self.wakes.borrow_mut().entry(at).or_insert(0) += 1;
    }
}

/// An established endpoint plus handles into its collaborator doubles.
pub struct Rig {
    pub link: LinkEndpoint,
    pub clock: Rc<SimClock>,
    pub sent: Rc<RefCell<Vec<(SimTime, LinkMessage)>>>,
    pub setup_sent: Rc<RefCell<Vec<LinkMessage>>>,
    pub setup_pending: Rc<RefCell<VecDeque<LinkMessage>>>,
    pub wakes: Rc<RefCell<BTreeMap<SimTime, u64>>>,
    pub period: Rc<Cell<SimTime>>,
}

/// Flit size the scripted router dictates in phase 1.
pub const FLIT_BITS: u64 = 64;

/// Endpoint identity the scripted router assigns.
pub const ENDPOINT_ID: u64 = 3;

impl Rig {
    /// Builds an endpoint advertising 10Gb/s against a scripted router
    /// advertising 8Gb/s, with 64-bit flits and 1Kb buffers (16 credits
    /// per VN locally). `peer_credits[vn]` is the initial grant the
    /// router reports for each VN during phase 2.
    pub fn establish(num_vns: usize, peer_credits: &[u64]) -> Rig {
        assert_eq!(peer_credits.len(), num_vns);

        let clock = SimClock::new();
        let sent = Rc::new(RefCell::new(Vec::new()));
        let setup_sent = Rc::new(RefCell::new(Vec::new()));
        let setup_pending = Rc::new(RefCell::new(VecDeque::new()));
        let wakes = Rc::new(RefCell::new(BTreeMap::new()));
        let period = Rc::new(Cell::new(0));

        let router = TestRouter {
            clock: clock.clone(),
            sent: sent.clone(),
            setup_sent: setup_sent.clone(),
            setup_pending: setup_pending.clone(),
        };
        let timer = TestTimer {
            clock: clock.clone(),
            period: period.clone(),
            wakes: wakes.clone(),
        };

        let config = LinkConfig::new("nic0", "10Gb/s", num_vns, "1Kb", "1Kb").unwrap();
        let mut link =
            LinkEndpoint::configure(&config, clock.clone(), Box::new(router), Box::new(timer))
                .unwrap();

        link.setup_phase(0).unwrap();
        {
            let mut pending = setup_pending.borrow_mut();
            pending.push_back(LinkMessage::Setup(SetupMessage::ReportBandwidth(
                Bandwidth::parse("8Gb/s").unwrap(),
            )));
            pending.push_back(LinkMessage::Setup(SetupMessage::ReportFlitSize(FLIT_BITS)));
            pending.push_back(LinkMessage::Setup(SetupMessage::ReportEndpointId(
                ENDPOINT_ID,
            )));
        }
        link.setup_phase(1).unwrap();

        {
            let mut pending = setup_pending.borrow_mut();
            for (vn, &credits) in peer_credits.iter().enumerate() {
                if credits > 0 {
                    pending.push_back(LinkMessage::Credit(CreditMessage::new(vn, credits)));
                }
            }
        }
        link.setup_phase(2).unwrap();

        Rig {
            link,
            clock,
            sent,
            setup_sent,
            setup_pending,
            wakes,
            period,
        }
    }

    /// Delivers a credit grant from the router at the current time.
    pub fn grant(&mut self, vn: VnId, credits: u64) {
        self.link
            .handle_link_event(LinkMessage::Credit(CreditMessage::new(vn, credits)))
            .unwrap();
    }

    /// Fires every queued wake-up with timestamp at or before `horizon`,
    /// in order, advancing the clock to each.
    pub fn run_arbiter(&mut self, horizon: SimTime) {
        loop {
            let next = self.wakes.borrow().keys().next().copied();
            let Some(at) = next.filter(|&at| at <= horizon) else {
                break;
            };
            {
                let mut wakes = self.wakes.borrow_mut();
                let remaining = {
                    let count = wakes.get_mut(&at).unwrap();
                    *count -= 1;
                    *count
                };
                if remaining == 0 {
                    wakes.remove(&at);
                }
            }
            if at > self.clock.now() {
                self.clock.set(at);
            }
            self.link.handle_output_wakeup();
        }
    }

    /// Returns the data packets transmitted so far, with timestamps.
    pub fn sent_packets(&self) -> Vec<(SimTime, Packet)> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|(at, msg)| match msg {
                LinkMessage::Packet(p) => Some((*at, p.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the credit messages transmitted so far.
    pub fn sent_credits(&self) -> Vec<CreditMessage> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|(_, msg)| match msg {
                LinkMessage::Credit(ce) => Some(*ce),
                _ => None,
            })
            .collect()
    }
}
