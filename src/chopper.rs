use crate::reading::{ComponentReading, NeutronData};
use bon::bon;
use log::{debug, warn};
use std::f64::consts::TAU;
use std::fmt;
use thiserror::Error;
use uom::si::angle::{degree, radian};
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Frequency, Length, Time};
use uom::si::frequency::hertz;
use uom::si::length::meter;
use uom::si::time::{microsecond, second};

/// Sense of rotation of a chopper disk, looking along the beam.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    AntiClockwise,
}

/// The error type returned when chopper parameters are rejected.
#[derive(Debug, Error)]
pub enum ChopperError {
    #[error("chopper frequency must be positive, got {frequency_hz} Hz")]
    NonPositiveFrequency { frequency_hz: f64 },
    #[error("either open/close or centers/widths must be provided, but not both")]
    CutoutsMisspecified,
    #[error("cutout angle lists must have equal lengths, got {lhs} and {rhs}")]
    CutoutLengthMismatch { lhs: usize, rhs: usize },
}

/// One transparency interval of a chopper, absolute on the simulation
/// clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GatingWindow {
    pub open: Time,
    pub close: Time,
}

impl GatingWindow {
    /// Whether a neutron arriving at `time` passes through this window.
    pub fn contains(&self, time: Time) -> bool {
        self.open <= time && time < self.close
    }
}

/// A rotating device with cutouts that blocks the beam at certain times.
///
/// The cutout geometry is given either as explicit `open`/`close` angle
/// lists or as `centers`/`widths`, never both. Cutouts are listed in
/// clockwise order; an anti-clockwise chopper presents them to the beam
/// last-first.
///
/// The phase offset is implemented as a time delay on real beamline
/// choppers, so it is applied in the opposite direction to the rotation.
/// A positive phase makes the windows open later for either direction.
#[derive(Clone, Debug)]
pub struct Chopper {
    frequency: Frequency,
    distance: Length,
    name: String,
    phase: Angle,
    open: Vec<Angle>,
    close: Vec<Angle>,
    direction: Direction,
}

#[bon]
impl Chopper {
    /// Validates the parameters and builds the chopper. Rejects a
    /// non-positive frequency, cutouts supplied in both representations
    /// or in neither, and angle lists of unequal lengths.
    ///
    /// # Examples
    ///
    /// ```
    /// use chop::{Chopper, Direction};
    /// use uom::si::angle::degree;
    /// use uom::si::f64::{Angle, Frequency, Length};
    /// use uom::si::frequency::hertz;
    /// use uom::si::length::meter;
    ///
    /// let chopper = Chopper::builder()
    ///     .frequency(Frequency::new::<hertz>(14.0))
    ///     .distance(Length::new::<meter>(6.6))
    ///     .name("WFM1")
    ///     .open(vec![Angle::new::<degree>(0.0), Angle::new::<degree>(50.0)])
    ///     .close(vec![Angle::new::<degree>(10.0), Angle::new::<degree>(65.0)])
    ///     .direction(Direction::AntiClockwise)
    ///     .build()?;
    /// assert_eq!(chopper.open().len(), 2);
    /// # Ok::<(), chop::ChopperError>(())
    /// ```
    #[builder]
    pub fn new(
        frequency: Frequency,
        distance: Length,
        #[builder(into)] name: String,
        #[builder(default = Angle::new::<degree>(0.0))] phase: Angle,
        open: Option<Vec<Angle>>,
        close: Option<Vec<Angle>>,
        centers: Option<Vec<Angle>>,
        widths: Option<Vec<Angle>>,
        #[builder(default = Direction::Clockwise)] direction: Direction,
    ) -> Result<Self, ChopperError> {
        let frequency_hz = frequency.get::<hertz>();
        if frequency_hz <= 0.0 {
            return Err(ChopperError::NonPositiveFrequency { frequency_hz });
        }

        let (open, close) = match (open, close, centers, widths) {
            (Some(open), Some(close), None, None) => {
                if open.len() != close.len() {
                    return Err(ChopperError::CutoutLengthMismatch {
                        lhs: open.len(),
                        rhs: close.len(),
                    });
                }
                (open, close)
            }
            (None, None, Some(centers), Some(widths)) => {
                if centers.len() != widths.len() {
                    return Err(ChopperError::CutoutLengthMismatch {
                        lhs: centers.len(),
                        rhs: widths.len(),
                    });
                }
                centers
                    .iter()
                    .zip(&widths)
                    .map(|(center, width)| {
                        let center = center.get::<degree>();
                        let half = 0.5 * width.get::<degree>();
                        (
                            Angle::new::<degree>(center - half),
                            Angle::new::<degree>(center + half),
                        )
                    })
                    .unzip()
            }
            _ => return Err(ChopperError::CutoutsMisspecified),
        };

        let phase_deg = phase.get::<degree>();
        if phase_deg.abs() >= 360.0 {
            // A single rotation of lookback cannot catch openings shifted
            // by a whole turn or more.
            warn!("chopper `{name}`: phase {phase_deg} deg is a full turn or more; windows may precede the lookback rotation");
        }

        Ok(Self {
            frequency,
            distance,
            name,
            phase,
            open,
            close,
            direction,
        })
    }
}

impl Chopper {
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Position along the beam axis, from the source.
    pub fn distance(&self) -> Length {
        self.distance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Angle {
        self.phase
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Opening angles of the cutouts, in clockwise order.
    pub fn open(&self) -> &[Angle] {
        &self.open
    }

    /// Closing angles of the cutouts, in clockwise order.
    pub fn close(&self) -> &[Angle] {
        &self.close
    }

    /// The angular velocity of the chopper.
    pub fn omega(&self) -> AngularVelocity {
        AngularVelocity::new::<radian_per_second>(TAU * self.frequency.get::<hertz>())
    }

    /// The times at which the chopper opens and closes.
    ///
    /// `time_limit` determines how many rotations the chopper needs to
    /// perform to reach it; passing zero yields a single rotation. One
    /// extra rotation of lookback is always included to catch windows
    /// that open before the first rotation because of the phase offset or
    /// wide cutouts.
    ///
    /// The two returned lists have equal length, one entry per rotation
    /// and cutout, grouped by rotation with cutouts in the order they
    /// pass the beam.
    pub fn open_close_times(&self, time_limit: Time) -> (Vec<Time>, Vec<Time>) {
        let frequency = self.frequency.get::<hertz>();
        let omega = TAU * frequency;
        let nrot = ((time_limit.get::<second>() * frequency).ceil() as i64).max(1);
        let phase = self.phase.get::<radian>();

        let mut open: Vec<f64> = self.open.iter().map(|a| a.get::<radian>()).collect();
        let mut close: Vec<f64> = self.close.iter().map(|a| a.get::<radian>()).collect();
        // Mirror the cutouts when the rotation is reversed: the last
        // listed cutout is then the first to pass the beam.
        if self.direction == Direction::AntiClockwise {
            let mirrored_open = close.iter().rev().map(|c| TAU - c).collect();
            let mirrored_close = open.iter().rev().map(|o| TAU - o).collect();
            open = mirrored_open;
            close = mirrored_close;
        }

        let count = (nrot + 1) as usize * open.len();
        let mut open_times = Vec::with_capacity(count);
        let mut close_times = Vec::with_capacity(count);
        for k in -1..nrot {
            let rotation = k as f64 * TAU + phase;
            for (&o, &c) in open.iter().zip(&close) {
                open_times.push(Time::new::<microsecond>((rotation + o) * 1.0e6 / omega));
                close_times.push(Time::new::<microsecond>((rotation + c) * 1.0e6 / omega));
            }
        }
        debug!(
            "chopper `{}`: {} windows over {} rotations",
            self.name,
            open_times.len(),
            nrot + 1
        );

        (open_times, close_times)
    }

    /// The gating windows as pairs, in the same order as
    /// [`open_close_times`](Chopper::open_close_times).
    pub fn windows(&self, time_limit: Time) -> Vec<GatingWindow> {
        let (open, close) = self.open_close_times(time_limit);
        open.into_iter()
            .zip(close)
            .map(|(open, close)| GatingWindow { open, close })
            .collect()
    }

    /// Record the neutrons that reached this chopper, along with the
    /// gating windows it was run with.
    pub fn reading(&self, data: NeutronData, time_limit: Time) -> ChopperReading {
        let (open_times, close_times) = self.open_close_times(time_limit);
        ChopperReading {
            name: self.name.clone(),
            distance: self.distance,
            frequency: self.frequency,
            phase: self.phase,
            open: self.open.clone(),
            close: self.close.clone(),
            open_times,
            close_times,
            data,
        }
    }
}

impl fmt::Display for Chopper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chopper(name={}, distance={}m, frequency={}Hz, phase={}deg, direction={:?}, cutouts={})",
            self.name,
            self.distance.get::<meter>(),
            self.frequency.get::<hertz>(),
            self.phase.get::<degree>(),
            self.direction,
            self.open.len()
        )
    }
}

/// Read-only record of the neutrons that reached a chopper.
#[derive(Clone, Debug)]
pub struct ChopperReading {
    pub name: String,
    pub distance: Length,
    pub frequency: Frequency,
    pub phase: Angle,
    pub open: Vec<Angle>,
    pub close: Vec<Angle>,
    pub open_times: Vec<Time>,
    pub close_times: Vec<Time>,
    pub data: NeutronData,
}

impl ComponentReading for ChopperReading {
    fn data(&self) -> &NeutronData {
        &self.data
    }
}

impl fmt::Display for ChopperReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ChopperReading: '{}'", self.name)?;
        writeln!(f, "  distance: {} m", self.distance.get::<meter>())?;
        writeln!(f, "  frequency: {} Hz", self.frequency.get::<hertz>())?;
        writeln!(f, "  phase: {} deg", self.phase.get::<degree>())?;
        writeln!(f, "  cutouts: {}", self.open.len())?;
        write!(
            f,
            "  neutrons: visible={}, blocked={}",
            self.data.visible(),
            self.data.blocked()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn deg(values: &[f64]) -> Vec<Angle> {
        values.iter().map(|&v| Angle::new::<degree>(v)).collect()
    }

    fn us(times: &[Time]) -> Vec<f64> {
        times.iter().map(|t| t.get::<microsecond>()).collect()
    }

    fn chopper(frequency: f64, open: &[f64], close: &[f64], direction: Direction) -> Chopper {
        Chopper::builder()
            .frequency(Frequency::new::<hertz>(frequency))
            .distance(Length::new::<meter>(8.0))
            .name("test")
            .open(deg(open))
            .close(deg(close))
            .direction(direction)
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_non_positive_frequency() {
        let err = Chopper::builder()
            .frequency(Frequency::new::<hertz>(0.0))
            .distance(Length::new::<meter>(8.0))
            .name("bad")
            .open(deg(&[0.0]))
            .close(deg(&[10.0]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ChopperError::NonPositiveFrequency { .. }));

        let err = Chopper::builder()
            .frequency(Frequency::new::<hertz>(-14.0))
            .distance(Length::new::<meter>(8.0))
            .name("bad")
            .open(deg(&[0.0]))
            .close(deg(&[10.0]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ChopperError::NonPositiveFrequency { .. }));
    }

    #[test]
    fn rejects_cutouts_given_both_ways_or_neither() {
        let err = Chopper::builder()
            .frequency(Frequency::new::<hertz>(14.0))
            .distance(Length::new::<meter>(8.0))
            .name("bad")
            .open(deg(&[0.0]))
            .close(deg(&[10.0]))
            .centers(deg(&[5.0]))
            .widths(deg(&[10.0]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ChopperError::CutoutsMisspecified));

        let err = Chopper::builder()
            .frequency(Frequency::new::<hertz>(14.0))
            .distance(Length::new::<meter>(8.0))
            .name("bad")
            .build()
            .unwrap_err();
        assert!(matches!(err, ChopperError::CutoutsMisspecified));

        let err = Chopper::builder()
            .frequency(Frequency::new::<hertz>(14.0))
            .distance(Length::new::<meter>(8.0))
            .name("bad")
            .open(deg(&[0.0]))
            .widths(deg(&[10.0]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ChopperError::CutoutsMisspecified));
    }

    #[test]
    fn rejects_unequal_angle_lists() {
        let err = Chopper::builder()
            .frequency(Frequency::new::<hertz>(14.0))
            .distance(Length::new::<meter>(8.0))
            .name("bad")
            .open(deg(&[0.0, 90.0]))
            .close(deg(&[10.0]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ChopperError::CutoutLengthMismatch { lhs: 2, rhs: 1 }
        ));
    }

    #[test]
    fn single_rotation_windows() {
        // 100 Hz, one cutout from 0 to 10 degrees. One rotation lasts
        // 10000 us and 10 degrees of rotation last 1e6/3600 us.
        let chopper = chopper(100.0, &[0.0], &[10.0], Direction::Clockwise);
        let (open, close) = chopper.open_close_times(Time::new::<microsecond>(0.0));

        assert_eq!(open.len(), 2);
        assert_eq!(close.len(), 2);
        let open = us(&open);
        let close = us(&close);
        let ten_deg = 1.0e6 / 3600.0;
        assert_abs_diff_eq!(open[0], -10_000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(open[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(close[0], -10_000.0 + ten_deg, epsilon = 1e-9);
        assert_abs_diff_eq!(close[1], ten_deg, epsilon = 1e-9);
    }

    #[test]
    fn window_count_scales_with_time_limit() {
        let chopper = chopper(100.0, &[0.0, 90.0], &[10.0, 100.0], Direction::Clockwise);
        // ceil(0.025 s * 100 Hz) = 3 rotations, plus one of lookback.
        let (open, close) = chopper.open_close_times(Time::new::<microsecond>(25_000.0));

        assert_eq!(open.len(), 8);
        assert_eq!(close.len(), 8);
        for (o, c) in open.iter().zip(&close) {
            assert!(c > o);
        }
        // Grouped by rotation, one rotation apart.
        let open = us(&open);
        for i in 0..6 {
            assert_abs_diff_eq!(open[i + 2] - open[i], 10_000.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn negative_time_limit_still_yields_one_rotation() {
        let chopper = chopper(100.0, &[0.0], &[10.0], Direction::Clockwise);
        let (open, _) = chopper.open_close_times(Time::new::<microsecond>(-500.0));
        assert_eq!(open.len(), 2);
    }

    #[test]
    fn no_cutouts_no_windows() {
        let chopper = chopper(100.0, &[], &[], Direction::Clockwise);
        let (open, close) = chopper.open_close_times(Time::new::<microsecond>(0.0));
        assert!(open.is_empty());
        assert!(close.is_empty());
    }

    #[test]
    fn anticlockwise_mirrors_and_reverses_cutouts() {
        let chopper = chopper(100.0, &[0.0, 90.0], &[10.0, 100.0], Direction::AntiClockwise);
        let (open, close) = chopper.open_close_times(Time::new::<microsecond>(0.0));

        // The second cutout passes the beam first, mirrored about the
        // full turn: (260, 270) then (350, 360) degrees.
        let per_deg = 1.0e6 / 36_000.0;
        let open = us(&open);
        let close = us(&close);
        assert_abs_diff_eq!(open[2], 260.0 * per_deg, epsilon = 1e-9);
        assert_abs_diff_eq!(close[2], 270.0 * per_deg, epsilon = 1e-9);
        assert_abs_diff_eq!(open[3], 350.0 * per_deg, epsilon = 1e-9);
        assert_abs_diff_eq!(close[3], 360.0 * per_deg, epsilon = 1e-9);
    }

    #[test]
    fn symmetric_cutout_is_direction_invariant() {
        // A cutout symmetric about 180 degrees maps onto itself when
        // mirrored about the full turn.
        let cw = chopper(14.0, &[170.0], &[190.0], Direction::Clockwise);
        let acw = chopper(14.0, &[170.0], &[190.0], Direction::AntiClockwise);

        let limit = Time::new::<microsecond>(200_000.0);
        let (cw_open, cw_close) = cw.open_close_times(limit);
        let (acw_open, acw_close) = acw.open_close_times(limit);

        assert_eq!(cw_open.len(), acw_open.len());
        for (a, b) in us(&cw_open).iter().zip(&us(&acw_open)) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        for (a, b) in us(&cw_close).iter().zip(&us(&acw_close)) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn phase_delays_windows_for_both_directions() {
        for direction in [Direction::Clockwise, Direction::AntiClockwise] {
            let base = chopper(14.0, &[10.0, 120.0], &[30.0, 160.0], direction);
            let delayed = Chopper::builder()
                .frequency(Frequency::new::<hertz>(14.0))
                .distance(Length::new::<meter>(8.0))
                .name("delayed")
                .phase(Angle::new::<degree>(20.0))
                .open(deg(&[10.0, 120.0]))
                .close(deg(&[30.0, 160.0]))
                .direction(direction)
                .build()
                .unwrap();

            let shift = 20.0 / 360.0 / 14.0 * 1.0e6;
            let limit = Time::new::<microsecond>(0.0);
            let (base_open, base_close) = base.open_close_times(limit);
            let (delayed_open, delayed_close) = delayed.open_close_times(limit);
            for (b, d) in us(&base_open).iter().zip(&us(&delayed_open)) {
                assert_abs_diff_eq!(d - b, shift, epsilon = 1e-9);
            }
            for (b, d) in us(&base_close).iter().zip(&us(&delayed_close)) {
                assert_abs_diff_eq!(d - b, shift, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn centers_and_widths_match_explicit_angles() {
        let explicit = chopper(56.0, &[5.0, 80.0], &[25.0, 110.0], Direction::Clockwise);
        let derived = Chopper::builder()
            .frequency(Frequency::new::<hertz>(56.0))
            .distance(Length::new::<meter>(8.0))
            .name("test")
            .centers(deg(&[15.0, 95.0]))
            .widths(deg(&[20.0, 30.0]))
            .build()
            .unwrap();

        let limit = Time::new::<microsecond>(30_000.0);
        let (a_open, a_close) = explicit.open_close_times(limit);
        let (b_open, b_close) = derived.open_close_times(limit);
        assert_eq!(a_open.len(), b_open.len());
        for (a, b) in us(&a_open).iter().zip(&us(&b_open)) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        for (a, b) in us(&a_close).iter().zip(&us(&b_close)) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn windows_pair_up_open_close_times() {
        let chopper = chopper(100.0, &[0.0, 90.0], &[10.0, 100.0], Direction::Clockwise);
        let limit = Time::new::<microsecond>(0.0);
        let windows = chopper.windows(limit);
        let (open, close) = chopper.open_close_times(limit);

        assert_eq!(windows.len(), open.len());
        for ((w, o), c) in windows.iter().zip(&open).zip(&close) {
            assert_eq!(w.open, *o);
            assert_eq!(w.close, *c);
        }
    }

    #[test]
    fn window_contains_is_half_open() {
        let window = GatingWindow {
            open: Time::new::<microsecond>(100.0),
            close: Time::new::<microsecond>(200.0),
        };
        assert!(window.contains(Time::new::<microsecond>(100.0)));
        assert!(window.contains(Time::new::<microsecond>(150.0)));
        assert!(!window.contains(Time::new::<microsecond>(200.0)));
        assert!(!window.contains(Time::new::<microsecond>(99.0)));
    }

    #[test]
    fn omega() {
        let chopper = chopper(100.0, &[0.0], &[10.0], Direction::Clockwise);
        assert_abs_diff_eq!(
            chopper.omega().get::<radian_per_second>(),
            TAU * 100.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn display() {
        let chopper = Chopper::builder()
            .frequency(Frequency::new::<hertz>(14.0))
            .distance(Length::new::<meter>(6.6))
            .name("WFM1")
            .phase(Angle::new::<degree>(30.0))
            .open(deg(&[0.0, 50.0]))
            .close(deg(&[10.0, 65.0]))
            .build()
            .unwrap();
        assert_eq!(
            chopper.to_string(),
            "Chopper(name=WFM1, distance=6.6m, frequency=14Hz, phase=30deg, \
             direction=Clockwise, cutouts=2)"
        );
    }

    #[test]
    fn reading_summarizes_blocking() {
        let chopper = chopper(100.0, &[0.0], &[10.0], Direction::Clockwise);
        let data = NeutronData::builder()
            .birth_time(array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]])
            .toa(array![[10.0, 11.0, 12.0], [13.0, 14.0, 15.0]])
            .wavelength(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
            .speed(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
            .blocked_by_me(array![[true, false, false], [false, false, false]])
            .blocked_by_others(array![[true, false, false], [false, true, false]])
            .build();

        let reading = chopper.reading(data, Time::new::<microsecond>(0.0));
        assert_eq!(reading.open_times.len(), 2);
        assert_eq!(reading.toa().visible(), 4);
        let text = reading.to_string();
        assert!(text.starts_with("ChopperReading: 'test'"));
        assert!(text.ends_with("neutrons: visible=4, blocked=2"));
    }
}
