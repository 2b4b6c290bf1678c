//! End-to-end checks of the sequential engine against small models: the
//! periodic generator scenario, injected-input dispatch, and the model
//! contract violations the simulator must reject.

use hysim_engine::prelude::*;

/// Emits one value every `period` units of time, forever.
struct Periodic {
    period: f64,
    pub out: Pin,
}

impl Periodic {
    fn new(period: f64) -> Self {
        Self {
            period,
            out: Pin::new(),
        }
    }
}

impl Atomic<char, f64> for Periodic {
    fn ta(&mut self) -> f64 {
        self.period
    }
    fn delta_int(&mut self) {}
    fn delta_ext(&mut self, _e: f64, _xb: &[PinValue<char>]) {}
    fn delta_conf(&mut self, _xb: &[PinValue<char>]) {}
    fn output_func(&mut self, yb: &mut Vec<PinValue<char>>) {
        yb.push(PinValue::new(self.out, 'a'));
    }
}

#[test]
fn periodic_generator_fires_ten_times() {
    let (mut sim, id) = Simulator::from_atomic(Periodic::new(10.0)).unwrap();
    let (listener, events) = ChannelListener::unbounded();
    sim.add_event_listener(listener);

    assert_eq!(sim.next_event_time(), 10.0);
    for _ in 0..10 {
        sim.exec_next_event().unwrap();
    }
    assert_eq!(sim.next_event_time(), 110.0);

    let outputs: Vec<(ComponentId, char, f64)> = events
        .try_iter()
        .filter_map(|ev| match ev {
            ListenerEvent::Output { model, value, t } => Some((model, value.value, t)),
            _ => None,
        })
        .collect();
    assert_eq!(outputs.len(), 10);
    for (i, &(model, value, t)) in outputs.iter().enumerate() {
        assert_eq!(model, id);
        assert_eq!(value, 'a');
        assert_eq!(t, 10.0 * (i + 1) as f64);
    }
}

/// Records which transition the engine dispatched.
#[derive(Default)]
struct Recorder {
    int_count: u32,
    ext_count: u32,
    conf_count: u32,
}

struct Phased {
    sigma: f64,
    log: Recorder,
}

impl Atomic<char, f64> for Phased {
    fn ta(&mut self) -> f64 {
        self.sigma
    }
    fn delta_int(&mut self) {
        self.log.int_count += 1;
        self.sigma = f64::INFINITY;
    }
    fn delta_ext(&mut self, _e: f64, _xb: &[PinValue<char>]) {
        self.log.ext_count += 1;
        self.sigma = f64::INFINITY;
    }
    fn delta_conf(&mut self, _xb: &[PinValue<char>]) {
        self.log.conf_count += 1;
        self.sigma = f64::INFINITY;
    }
    fn output_func(&mut self, _yb: &mut Vec<PinValue<char>>) {}
}

#[test]
fn input_at_the_internal_event_time_is_confluent() {
    let mut graph: Graph<char, f64> = Graph::new();
    let pin = graph.add_pin();
    let id = graph.add_atomic(Phased {
        sigma: 5.0,
        log: Recorder::default(),
    });
    graph.connect_component(pin, id);

    let mut sim = Simulator::new(graph).unwrap();
    sim.inject_input(PinValue::new(pin, 'x'));
    let t = sim.exec_next_event().unwrap();
    assert_eq!(t, 5.0);

    let model: &Phased = sim.graph().get(id).unwrap();
    assert_eq!(model.log.conf_count, 1);
    assert_eq!(model.log.int_count, 0);
    assert_eq!(model.log.ext_count, 0);
}

#[test]
fn input_before_the_internal_event_time_is_external() {
    let mut graph: Graph<char, f64> = Graph::new();
    let pin = graph.add_pin();
    let id = graph.add_atomic(Phased {
        sigma: 5.0,
        log: Recorder::default(),
    });
    graph.connect_component(pin, id);

    let mut sim = Simulator::new(graph).unwrap();
    sim.inject_input(PinValue::new(pin, 'x'));
    sim.set_next_time(2.0);
    sim.exec_next_event().unwrap();

    let model: &Phased = sim.graph().get(id).unwrap();
    assert_eq!(model.log.ext_count, 1);
    assert_eq!(model.log.conf_count, 0);
}

/// A model whose next event time is always infinity.
struct Passive;

impl Atomic<char, f64> for Passive {
    fn ta(&mut self) -> f64 {
        f64::INFINITY
    }
    fn delta_int(&mut self) {}
    fn delta_ext(&mut self, _e: f64, _xb: &[PinValue<char>]) {}
    fn delta_conf(&mut self, _xb: &[PinValue<char>]) {}
    fn output_func(&mut self, _yb: &mut Vec<PinValue<char>>) {}
}

#[test]
fn passive_model_never_fires() {
    let (mut sim, _) = Simulator::from_atomic(Passive).unwrap();
    assert_eq!(sim.next_event_time(), f64::INFINITY);
    sim.exec_until(1.0e9).unwrap();
    assert_eq!(sim.next_event_time(), f64::INFINITY);
}

struct NegativeTa;

impl Atomic<char, f64> for NegativeTa {
    fn ta(&mut self) -> f64 {
        -1.0
    }
    fn delta_int(&mut self) {}
    fn delta_ext(&mut self, _e: f64, _xb: &[PinValue<char>]) {}
    fn delta_conf(&mut self, _xb: &[PinValue<char>]) {}
    fn output_func(&mut self, _yb: &mut Vec<PinValue<char>>) {}
}

#[test]
fn negative_time_advance_is_rejected_at_construction() {
    let result = Simulator::from_atomic(NegativeTa);
    assert!(matches!(
        result.map(|_| ()),
        Err(SimError::NegativeTimeAdvance { .. })
    ));
}

#[test]
fn self_coupling_is_rejected() {
    let mut graph: Graph<char, f64> = Graph::new();
    let model = Periodic::new(1.0);
    let out = model.out;
    let id = graph.add_atomic(model);
    graph.connect_component(out, id);

    let mut sim = Simulator::new(graph).unwrap();
    assert!(matches!(
        sim.exec_next_event(),
        Err(SimError::SelfCoupling { component }) if component == id
    ));
}

/// The chain generator -> relay -> listener delivers on the relay's pin.
struct Relay {
    sigma: f64,
    pending: Option<char>,
    pub out: Pin,
}

impl Atomic<char, f64> for Relay {
    fn ta(&mut self) -> f64 {
        self.sigma
    }
    fn delta_int(&mut self) {
        self.sigma = f64::INFINITY;
        self.pending = None;
    }
    fn delta_ext(&mut self, _e: f64, xb: &[PinValue<char>]) {
        self.pending = Some(xb[0].value);
        self.sigma = 1.0;
    }
    fn delta_conf(&mut self, xb: &[PinValue<char>]) {
        self.delta_int();
        self.delta_ext(0.0, xb);
    }
    fn output_func(&mut self, yb: &mut Vec<PinValue<char>>) {
        if let Some(value) = self.pending {
            yb.push(PinValue::new(self.out, value));
        }
    }
}

#[test]
fn relayed_output_arrives_one_delay_later() {
    let mut graph: Graph<char, f64> = Graph::new();
    let genr = Periodic::new(10.0);
    let genr_out = genr.out;
    graph.add_atomic(genr);
    let relay = Relay {
        sigma: f64::INFINITY,
        pending: None,
        out: Pin::new(),
    };
    let relay_out = relay.out;
    let relay_id = graph.add_atomic(relay);
    graph.connect_component(genr_out, relay_id);

    let mut sim = Simulator::new(graph).unwrap();
    let (listener, events) = ChannelListener::unbounded();
    sim.add_event_listener(listener);

    sim.exec_until(12.0).unwrap();
    let relayed: Vec<(f64, Pin)> = events
        .try_iter()
        .filter_map(|ev| match ev {
            ListenerEvent::Output { model, value, t } if model == relay_id => {
                Some((t, value.pin))
            }
            _ => None,
        })
        .collect();
    assert_eq!(relayed, vec![(11.0, relay_out)]);
}
