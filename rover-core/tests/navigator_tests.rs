use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

use embedded_hal::delay::DelayNs;
use rover_core::utils::{
    config::NavConfig,
    controllers::{MotionActuator, MotorCommand, Pivot},
    navigation::{NavError, Navigator, NavigatorState, StopReason},
    sensors::{
        odometer::{Odometer, PulseCounter},
        Clock, Direction, DistanceReading, RangeSensors,
    },
};

const NEAR: DistanceReading = DistanceReading::Cm { d: 10.0 };
const FRONT_HIT: DistanceReading = DistanceReading::Cm { d: 25.0 };
const FAR: DistanceReading = DistanceReading::Cm { d: 50.0 };

/// Shared simulated time, motor state and encoder timing.
struct Rig {
    now_ns: u64,
    motion: MotorCommand,
    speed: f32,
    commands: Vec<MotorCommand>,
    /// Encoder edge spacing while the wheels turn; `None` stalls the encoder.
    edge_period_us: Option<u64>,
    next_edge_us: u64,
    /// Add a contact bounce this long after every real edge.
    bounce_us: Option<u64>,
    measurements: Vec<(Direction, u64)>,
}

type Shared = Rc<RefCell<Rig>>;

fn rig(edge_period_us: u64) -> Shared {
    Rc::new(RefCell::new(Rig {
        now_ns: 0,
        motion: MotorCommand::STOP,
        speed: 0.0,
        commands: Vec::new(),
        edge_period_us: Some(edge_period_us),
        next_edge_us: 0,
        bounce_us: None,
        measurements: Vec::new(),
    }))
}

struct RigDelay<'a> {
    rig: Shared,
    odometer: &'a Odometer,
}

impl DelayNs for RigDelay<'_> {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        let mut rig = self.rig.borrow_mut();
        let end_ns = rig.now_ns + ns as u64;
        if let (false, Some(period)) = (rig.motion.is_stopped(), rig.edge_period_us) {
            while rig.next_edge_us * 1_000 <= end_ns {
                let edge = rig.next_edge_us;
                self.odometer.on_edge(edge as u32);
                if let Some(bounce) = rig.bounce_us {
                    self.odometer.on_edge((edge + bounce) as u32);
                }
                rig.next_edge_us += period;
            }
        }
        rig.now_ns = end_ns;
    }
}

#[derive(Clone)]
struct RigClock(Shared);

impl Clock for RigClock {
    fn now_us(&self) -> u32 {
        (self.0.borrow().now_ns / 1_000) as u32
    }
}

struct RigActuator(Shared);

impl MotionActuator for RigActuator {
    type Error = Infallible;

    fn apply(
        &mut self,
        command: MotorCommand,
    ) -> Result<(), Self::Error> {
        let mut rig = self.0.borrow_mut();
        if rig.motion.is_stopped() && !command.is_stopped() {
            if let Some(period) = rig.edge_period_us {
                rig.next_edge_us = rig.now_ns / 1_000 + period;
            }
        }
        rig.motion = command;
        rig.commands.push(command);
        Ok(())
    }

    fn set_speed(
        &mut self,
        level: f32,
    ) -> Result<(), Self::Error> {
        self.0.borrow_mut().speed = level;
        Ok(())
    }
}

/// Per-direction scripted readings; `Timeout` once a script runs out.
struct ScriptedSensors {
    rig: Shared,
    scripts: [VecDeque<DistanceReading>; 3],
}

impl ScriptedSensors {
    fn new(
        rig: Shared,
        front: &[DistanceReading],
        left: &[DistanceReading],
        right: &[DistanceReading],
    ) -> Self {
        Self {
            rig,
            scripts: [
                front.iter().copied().collect(),
                left.iter().copied().collect(),
                right.iter().copied().collect(),
            ],
        }
    }
}

impl RangeSensors for ScriptedSensors {
    type Error = Infallible;

    fn measure(
        &mut self,
        direction: Direction,
    ) -> Result<DistanceReading, Self::Error> {
        let mut rig = self.rig.borrow_mut();
        let now = rig.now_ns;
        rig.measurements.push((direction, now));
        let idx = match direction {
            Direction::Front => 0,
            Direction::Left => 1,
            Direction::Right => 2,
        };
        Ok(self.scripts[idx]
            .pop_front()
            .unwrap_or(DistanceReading::Timeout))
    }
}

type TestNavigator<'a> = Navigator<'a, ScriptedSensors, RigActuator, Odometer, RigDelay<'a>, RigClock>;

fn navigator<'a>(
    rig: &Shared,
    odometer: &'a Odometer,
    sensors: ScriptedSensors,
    config: NavConfig,
) -> TestNavigator<'a> {
    Navigator::new(
        sensors,
        RigActuator(rig.clone()),
        odometer,
        RigDelay {
            rig: rig.clone(),
            odometer,
        },
        RigClock(rig.clone()),
        config,
    )
}

fn commands(rig: &Shared) -> Vec<MotorCommand> {
    rig.borrow().commands.clone()
}

#[test]
fn test_open_course_reaches_goal_without_avoiding() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FAR, FAR, FAR], &[], &[NEAR]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    let mut history = vec![nav.state()];
    while !nav.state().is_terminal() {
        history.push(nav.step().unwrap());
    }

    assert!(history
        .iter()
        .all(|s| !matches!(s, NavigatorState::Avoiding { .. } | NavigatorState::Turning { .. })));
    assert_eq!(
        nav.state(),
        NavigatorState::Stopped {
            reason: StopReason::GoalReached
        }
    );
    assert!(odometer.read() >= 281);
    assert_eq!(commands(&rig).last(), Some(&MotorCommand::STOP));
    assert_eq!(commands(&rig).first(), Some(&MotorCommand::FORWARD));
    assert_eq!(rig.borrow().speed, NavConfig::default().motor_speed);
}

#[test]
fn test_run_returns_goal_reached() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[], &[], &[]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());
    assert_eq!(nav.run().unwrap(), StopReason::GoalReached);
    assert_eq!(nav.target_pulses(), 281);
}

#[test]
fn test_left_blocked_pivots_right_then_resumes() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[NEAR], &[FAR]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    assert_eq!(
        nav.step().unwrap(),
        NavigatorState::Avoiding {
            left: NEAR,
            right: FAR
        }
    );
    assert_eq!(
        nav.step().unwrap(),
        NavigatorState::Turning { pivot: Pivot::Right }
    );
    assert_eq!(nav.step().unwrap(), NavigatorState::Forward);
    assert_eq!(odometer.read(), nav.turn_pulses());

    assert_eq!(
        commands(&rig),
        vec![
            MotorCommand::FORWARD,
            MotorCommand::STOP,
            MotorCommand::pivot(Pivot::Right),
            MotorCommand::STOP,
            MotorCommand::FORWARD,
        ]
    );

    loop {
        if let NavigatorState::Stopped { reason } = nav.step().unwrap() {
            assert_eq!(reason, StopReason::GoalReached);
            break;
        }
    }
}

#[test]
fn test_right_blocked_pivots_left() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[FAR], &[NEAR]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    nav.step().unwrap();
    assert_eq!(
        nav.step().unwrap(),
        NavigatorState::Turning { pivot: Pivot::Left }
    );
}

#[test]
fn test_both_sides_clear_defaults_left() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[], &[FAR]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    nav.step().unwrap();
    assert_eq!(
        nav.step().unwrap(),
        NavigatorState::Turning { pivot: Pivot::Left }
    );
}

#[test]
fn test_boxed_in_stops_for_good() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[NEAR], &[NEAR]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    nav.step().unwrap();
    let paused_from = rig.borrow().now_ns;
    assert_eq!(
        nav.step().unwrap(),
        NavigatorState::Stopped {
            reason: StopReason::BoxedIn
        }
    );
    assert!(rig.borrow().now_ns - paused_from >= 1_000_000_000);
    assert_eq!(commands(&rig), vec![MotorCommand::FORWARD, MotorCommand::STOP]);

    // Terminal: further steps issue nothing
    nav.step().unwrap();
    nav.step().unwrap();
    assert_eq!(commands(&rig).len(), 2);
    assert!(rig.borrow().motion.is_stopped());
}

#[test]
fn test_run_returns_boxed_in() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FAR, FRONT_HIT], &[FAR, NEAR], &[FAR, NEAR]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());
    assert_eq!(nav.run().unwrap(), StopReason::BoxedIn);
}

#[test]
fn test_sensors_polled_in_order_with_settle_delay() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[], &[], &[]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    nav.step().unwrap();
    nav.step().unwrap();

    let log = rig.borrow().measurements.clone();
    let order: Vec<Direction> = log.iter().map(|(d, _)| *d).collect();
    assert_eq!(
        order,
        vec![
            Direction::Front,
            Direction::Left,
            Direction::Right,
            Direction::Front,
            Direction::Left,
            Direction::Right,
        ]
    );
    for pair in log.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= 50_000_000, "settle delay violated");
    }
}

#[test]
fn test_stalled_turn_is_reported() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[], &[]);
    let mut nav = navigator(&rig, &odometer, sensors, NavConfig::default());

    nav.start().unwrap();
    nav.step().unwrap();
    nav.step().unwrap();
    rig.borrow_mut().edge_period_us = None;

    let turn_started = rig.borrow().now_ns;
    match nav.step() {
        Err(NavError::TurnStalled { counted, required }) => {
            assert_eq!(counted, 0);
            assert_eq!(required, 32);
        }
        other => panic!("expected stall, got {:?}", other),
    }
    assert!(rig.borrow().now_ns - turn_started >= 5_000_000_000);
    assert_eq!(commands(&rig).last(), Some(&MotorCommand::STOP));
}

#[test]
fn test_unbounded_turn_still_completes() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[], &[]);
    let config = NavConfig {
        turn_timeout_ms: None,
        ..NavConfig::default()
    };
    let mut nav = navigator(&rig, &odometer, sensors, config);
    assert_eq!(nav.run().unwrap(), StopReason::GoalReached);
}

#[test]
fn test_encoder_bounce_does_not_inflate_distance() {
    let clean_rig = rig(5_000);
    let clean_odo = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(clean_rig.clone(), &[], &[], &[]);
    let mut clean = navigator(&clean_rig, &clean_odo, sensors, NavConfig::default());
    clean.run().unwrap();

    let noisy_rig = rig(5_000);
    noisy_rig.borrow_mut().bounce_us = Some(300);
    let noisy_odo = Odometer::new(1_000);
    let sensors = ScriptedSensors::new(noisy_rig.clone(), &[], &[], &[]);
    let mut noisy = navigator(&noisy_rig, &noisy_odo, sensors, NavConfig::default());
    noisy.run().unwrap();

    assert_eq!(clean_odo.read(), noisy_odo.read());
    assert_eq!(clean_rig.borrow().now_ns, noisy_rig.borrow().now_ns);
}

#[test]
fn test_navigator_accepts_type_erased_pulse_counter() {
    let rig = rig(5_000);
    let odometer = Odometer::new(1_000);
    let counter: &dyn PulseCounter = &odometer;
    let sensors = ScriptedSensors::new(rig.clone(), &[FRONT_HIT], &[NEAR], &[FAR]);
    let mut nav: Navigator<'_, ScriptedSensors, RigActuator, dyn PulseCounter, RigDelay<'_>, RigClock> =
        Navigator::new(
            sensors,
            RigActuator(rig.clone()),
            counter,
            RigDelay {
                rig: rig.clone(),
                odometer: &odometer,
            },
            RigClock(rig.clone()),
            NavConfig::default(),
        );

    assert_eq!(nav.run().unwrap(), StopReason::GoalReached);
    assert!(counter.read() >= nav.target_pulses());
    assert!(commands(&rig).contains(&MotorCommand::pivot(Pivot::Right)));
}
