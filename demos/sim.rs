/// This is a general example of how transport code drives the choppers:
/// generate neutrons, check their arrival times against each chopper's
/// gating windows, and hand the outcome to the first chopper's reading.
use anyhow::{Context, Result};
use chop::{Chopper, ComponentReading, NeutronData};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use uom::si::angle::degree;
use uom::si::f64::{Angle, Frequency, Length, Time};
use uom::si::frequency::hertz;
use uom::si::length::meter;
use uom::si::time::microsecond;

const PULSES: usize = 2;
const NEUTRONS_PER_PULSE: usize = 100_000;
// 14 Hz source frame.
const PULSE_PERIOD: f64 = 1.0e6 / 14.0;
// A thermal neutron travels at roughly 3956/lambda m/s with lambda in
// angstroms.
const SPEED_PER_INVERSE_ANGSTROM: f64 = 3956.0;

fn deg(values: &[f64]) -> Vec<Angle> {
    values.iter().map(|&v| Angle::new::<degree>(v)).collect()
}

fn main() -> Result<()> {
    env_logger::init();

    // ===========================================
    // The beamline: a wavelength-frame-multiplication chopper and a
    // frame-overlap chopper further downstream.
    let wfm = Chopper::builder()
        .frequency(Frequency::new::<hertz>(70.0))
        .distance(Length::new::<meter>(6.6))
        .name("WFM")
        .phase(Angle::new::<degree>(47.1))
        .centers(deg(&[11.0, 43.0, 82.5, 121.5, 160.5, 199.0]))
        .widths(deg(&[8.0, 11.0, 13.0, 15.0, 17.0, 19.0]))
        .build()?;
    let frame_overlap = Chopper::builder()
        .frequency(Frequency::new::<hertz>(14.0))
        .distance(Length::new::<meter>(8.8))
        .name("FOL")
        .phase(Angle::new::<degree>(30.0))
        .open(deg(&[0.0]))
        .close(deg(&[75.0]))
        .build()?;
    // ===========================================

    let horizon = Time::new::<microsecond>(PULSES as f64 * PULSE_PERIOD);
    let wfm_windows = wfm.windows(horizon);
    let fol_windows = frame_overlap.windows(horizon);

    // ===========================================
    // The source: uniform emission over a short pulse, thermal-ish
    // wavelength spectrum.
    let mut rng = rand::rng();
    let spectrum = Normal::<f64>::new(3.0, 1.2).context("failed to create wavelength spectrum")?;

    let count = PULSES * NEUTRONS_PER_PULSE;
    let mut birth_time = Vec::with_capacity(count);
    let mut toa = Vec::with_capacity(count);
    let mut wavelength = Vec::with_capacity(count);
    let mut speed = Vec::with_capacity(count);
    let mut blocked_by_me = Vec::with_capacity(count);
    let mut blocked_by_others = Vec::with_capacity(count);

    let wfm_distance = wfm.distance().get::<meter>();
    let fol_distance = frame_overlap.distance().get::<meter>();
    for pulse in 0..PULSES {
        let offset = pulse as f64 * PULSE_PERIOD;
        for _ in 0..NEUTRONS_PER_PULSE {
            let birth = offset + rng.random_range(0.0..300.0);
            let lambda = spectrum.sample(&mut rng).max(0.3);
            let v = SPEED_PER_INVERSE_ANGSTROM / lambda;
            let at_wfm = birth + wfm_distance / v * 1.0e6;
            let at_fol = birth + fol_distance / v * 1.0e6;

            birth_time.push(birth);
            toa.push(at_wfm);
            wavelength.push(lambda);
            speed.push(v);

            let at_wfm = Time::new::<microsecond>(at_wfm);
            let at_fol = Time::new::<microsecond>(at_fol);
            blocked_by_me.push(!wfm_windows.iter().any(|w| w.contains(at_wfm)));
            blocked_by_others.push(!fol_windows.iter().any(|w| w.contains(at_fol)));
        }
    }
    // ===========================================

    let shape = (PULSES, NEUTRONS_PER_PULSE);
    let data = NeutronData::builder()
        .birth_time(Array2::from_shape_vec(shape, birth_time)?)
        .toa(Array2::from_shape_vec(shape, toa)?)
        .wavelength(Array2::from_shape_vec(shape, wavelength)?)
        .speed(Array2::from_shape_vec(shape, speed)?)
        .blocked_by_me(Array2::from_shape_vec(shape, blocked_by_me)?)
        .blocked_by_others(Array2::from_shape_vec(shape, blocked_by_others)?)
        .build();

    let reading = wfm.reading(data, horizon);
    println!("{wfm}");
    println!("{frame_overlap}");
    println!("{reading}");
    println!("{}", reading.toa());
    println!("{}", reading.wavelength());
    for pulse in 0..PULSES {
        println!("pulse {pulse}: {}", reading.toa().pulse(pulse));
    }

    Ok(())
}
