use bon::bon;
use ndarray::{s, ArcArray, ArcArray2, Array2, ArrayView, ArrayView2, Axis, Dimension, Ix1, Ix2};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// The error type returned when a reduction finds no unblocked neutrons.
///
/// Every entry of the field was blocked either by the owning component or
/// by another component in the beam path. Reporting layers are expected to
/// display this as "no visible neutrons" rather than abort.
#[derive(Clone, Copy, Debug, Error)]
#[error("no unblocked neutrons in `{field}`")]
pub struct EmptySelection {
    pub field: &'static str,
}

/// Per-neutron record of one simulation run, organized pulse-major.
///
/// Holds one value array per physical quantity, shaped
/// `(pulses, neutrons_per_pulse)`, together with two boolean masks of the
/// same shape: `blocked_by_me` marks neutrons stopped by the component that
/// owns this data, `blocked_by_others` marks neutrons stopped anywhere else
/// in the beam path. The two masks are kept separate so a consumer can
/// still tell the causes apart after the run.
///
/// All arrays are reference-counted, so the field views derived from this
/// data share storage instead of copying it.
#[derive(Clone, Debug)]
pub struct NeutronData {
    birth_time: ArcArray2<f64>,
    toa: ArcArray2<f64>,
    wavelength: ArcArray2<f64>,
    speed: ArcArray2<f64>,
    blocked_by_me: ArcArray2<bool>,
    blocked_by_others: ArcArray2<bool>,
}

#[bon]
impl NeutronData {
    /// Assemble the record from the value arrays and the two blocking
    /// masks.
    ///
    /// # Panics
    ///
    /// Panics if any array has a shape different from `birth_time`. Shape
    /// agreement is part of the contract with the transport code that
    /// fills these arrays in, so a mismatch is not recoverable.
    ///
    /// # Examples
    ///
    /// ```
    /// use chop::NeutronData;
    /// use ndarray::array;
    ///
    /// let data = NeutronData::builder()
    ///     .birth_time(array![[0.0, 5.0]])
    ///     .toa(array![[1500.0, 1700.0]])
    ///     .wavelength(array![[2.1, 4.4]])
    ///     .speed(array![[1883.8, 899.1]])
    ///     .blocked_by_me(array![[false, true]])
    ///     .blocked_by_others(array![[false, false]])
    ///     .build();
    /// assert_eq!(data.visible(), 1);
    /// ```
    #[builder]
    pub fn new(
        birth_time: Array2<f64>,
        toa: Array2<f64>,
        wavelength: Array2<f64>,
        speed: Array2<f64>,
        blocked_by_me: Array2<bool>,
        blocked_by_others: Array2<bool>,
    ) -> Self {
        let dim = birth_time.dim();
        for (name, other) in [
            ("toa", toa.dim()),
            ("wavelength", wavelength.dim()),
            ("speed", speed.dim()),
            ("blocked_by_me", blocked_by_me.dim()),
            ("blocked_by_others", blocked_by_others.dim()),
        ] {
            assert_eq!(
                dim, other,
                "`{name}` shape {other:?} does not match `birth_time` shape {dim:?}"
            );
        }

        Self {
            birth_time: birth_time.into_shared(),
            toa: toa.into_shared(),
            wavelength: wavelength.into_shared(),
            speed: speed.into_shared(),
            blocked_by_me: blocked_by_me.into_shared(),
            blocked_by_others: blocked_by_others.into_shared(),
        }
    }
}

impl NeutronData {
    /// Number of pulses in the run.
    pub fn pulses(&self) -> usize {
        self.toa.nrows()
    }

    /// Number of neutrons per pulse.
    pub fn neutrons_per_pulse(&self) -> usize {
        self.toa.ncols()
    }

    /// Total number of neutrons across all pulses.
    pub fn size(&self) -> usize {
        self.toa.len()
    }

    /// Number of neutrons blocked by at least one component. A neutron
    /// blocked both here and elsewhere counts once.
    pub fn blocked(&self) -> usize {
        self.blocked_by_me
            .iter()
            .zip(self.blocked_by_others.iter())
            .filter(|&(&me, &others)| me || others)
            .count()
    }

    /// Number of neutrons that no component blocked.
    pub fn visible(&self) -> usize {
        self.size() - self.blocked()
    }

    pub fn blocked_by_me(&self) -> ArrayView2<'_, bool> {
        self.blocked_by_me.view()
    }

    pub fn blocked_by_others(&self) -> ArrayView2<'_, bool> {
        self.blocked_by_others.view()
    }

    fn field(&self, name: &'static str, unit: &'static str, values: &ArcArray2<f64>) -> ReadingField {
        ReadingField {
            name,
            unit,
            values: values.clone(),
            blocked_by_me: self.blocked_by_me.clone(),
            blocked_by_others: self.blocked_by_others.clone(),
        }
    }

    /// Time of arrival at the component, in microseconds.
    pub fn toa(&self) -> ReadingField {
        self.field("toa", "μs", &self.toa)
    }

    /// Neutron wavelength, in angstroms.
    pub fn wavelength(&self) -> ReadingField {
        self.field("wavelength", "Å", &self.wavelength)
    }

    /// Emission time at the source, in microseconds.
    pub fn birth_time(&self) -> ReadingField {
        self.field("birth_time", "μs", &self.birth_time)
    }

    /// Neutron speed, in meters per second.
    pub fn speed(&self) -> ReadingField {
        self.field("speed", "m/s", &self.speed)
    }
}

/// One physical quantity of a [`NeutronData`] record together with the two
/// blocking masks.
///
/// The values and both masks always have the same shape; indexing and
/// slicing go through methods that re-index all three together so they
/// cannot drift apart. Statistics only ever look at entries that neither
/// mask flags.
#[derive(Clone, Debug)]
pub struct ReadingField<D: Dimension = Ix2> {
    name: &'static str,
    unit: &'static str,
    values: ArcArray<f64, D>,
    blocked_by_me: ArcArray<bool, D>,
    blocked_by_others: ArcArray<bool, D>,
}

impl<D: Dimension> ReadingField<D> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn unit(&self) -> &'static str {
        self.unit
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Total number of neutrons in the field, blocked or not.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> ArrayView<'_, f64, D> {
        self.values.view()
    }

    pub fn blocked_by_me(&self) -> ArrayView<'_, bool, D> {
        self.blocked_by_me.view()
    }

    pub fn blocked_by_others(&self) -> ArrayView<'_, bool, D> {
        self.blocked_by_others.view()
    }

    /// Values of the neutrons that no component blocked, in storage order.
    pub fn unblocked(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(self.blocked_by_me.iter())
            .zip(self.blocked_by_others.iter())
            .filter(|&((_, &me), &others)| !me && !others)
            .map(|((&value, _), _)| value)
    }

    /// Number of neutrons that no component blocked.
    pub fn visible(&self) -> usize {
        self.unblocked().count()
    }

    /// Smallest unblocked value.
    pub fn min(&self) -> Result<f64, EmptySelection> {
        self.unblocked()
            .fold(None, |acc: Option<f64>, value| {
                Some(acc.map_or(value, |m| m.min(value)))
            })
            .ok_or(EmptySelection { field: self.name })
    }

    /// Largest unblocked value.
    pub fn max(&self) -> Result<f64, EmptySelection> {
        self.unblocked()
            .fold(None, |acc: Option<f64>, value| {
                Some(acc.map_or(value, |m| m.max(value)))
            })
            .ok_or(EmptySelection { field: self.name })
    }
}

impl ReadingField<Ix2> {
    /// Number of pulses in the field.
    pub fn pulses(&self) -> usize {
        self.values.nrows()
    }

    /// A new field holding only the given pulse, with values and masks
    /// indexed together.
    pub fn pulse(&self, index: usize) -> ReadingField<Ix1> {
        ReadingField {
            name: self.name,
            unit: self.unit,
            values: self.values.index_axis(Axis(0), index).to_owned().into_shared(),
            blocked_by_me: self
                .blocked_by_me
                .index_axis(Axis(0), index)
                .to_owned()
                .into_shared(),
            blocked_by_others: self
                .blocked_by_others
                .index_axis(Axis(0), index)
                .to_owned()
                .into_shared(),
        }
    }

    /// A new field holding the given pulse range, with values and masks
    /// sliced together.
    pub fn slice_pulses(&self, pulses: Range<usize>) -> ReadingField<Ix2> {
        ReadingField {
            name: self.name,
            unit: self.unit,
            values: self.values.slice(s![pulses.clone(), ..]).to_owned().into_shared(),
            blocked_by_me: self
                .blocked_by_me
                .slice(s![pulses.clone(), ..])
                .to_owned()
                .into_shared(),
            blocked_by_others: self
                .blocked_by_others
                .slice(s![pulses, ..])
                .to_owned()
                .into_shared(),
        }
    }
}

impl<D: Dimension> fmt::Display for ReadingField<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min(), self.max()) {
            (Ok(min), Ok(max)) => write!(
                f,
                "{} [{}]: min={min}, max={max}, events={}",
                self.name,
                self.unit,
                self.visible()
            ),
            _ => write!(f, "{} [{}]: no visible neutrons", self.name, self.unit),
        }
    }
}

/// Data reading for a component placed in the beam path.
///
/// The reading records the neutrons that reached the component as one
/// [`NeutronData`] and exposes each physical quantity as a
/// [`ReadingField`] sharing the same pair of blocking masks. Implementors
/// only supply [`data`](ComponentReading::data).
pub trait ComponentReading {
    fn data(&self) -> &NeutronData;

    fn toa(&self) -> ReadingField {
        self.data().toa()
    }

    fn wavelength(&self) -> ReadingField {
        self.data().wavelength()
    }

    fn birth_time(&self) -> ReadingField {
        self.data().birth_time()
    }

    fn speed(&self) -> ReadingField {
        self.data().speed()
    }
}
