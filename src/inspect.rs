//! Inspection of converted containers
//!
//! Lists patients or prints one patient's field shapes and prepares a depth
//! slice for display. Drawing is left to a [`SliceRenderer`].

use crate::access::{Container, PatientData};
use crate::error::Result;
use crate::metadata::{Field, STRUCTURE_MASK_NAMES};
use crate::utils::format_shape;
use ndarray::{Array2, Array3};
use std::io::Write;
use std::path::Path;

/// Depth slice shown when none is requested
pub const DEFAULT_SLICE_INDEX: usize = 64;

/// RGB colours for the first ten structures of the overlay
pub const STRUCTURE_COLORS: [[f32; 3]; 10] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [0.5, 0.5, 0.0],
    [0.5, 0.0, 0.5],
    [0.0, 0.5, 0.5],
    [0.7, 0.3, 0.3],
];

/// The panels of one depth slice of a patient
#[derive(Debug, Clone, PartialEq)]
pub struct SliceView {
    pub slice_index: usize,
    pub ct: Array2<f64>,
    pub dose: Array2<f64>,
    pub possible_dose_mask: Array2<f64>,
    /// `(rows, cols, 3)` RGB image; later structures paint over earlier ones
    pub structure_overlay: Array3<f32>,
    /// Name and colour of each structure drawn in the overlay
    pub legend: Vec<(String, [f32; 3])>,
}

impl SliceView {
    pub fn extract(data: &PatientData, slice_index: usize) -> Result<Self> {
        let ct = data.require(Field::Ct)?.depth_slice(slice_index, 0)?;
        let dose = data.require(Field::Dose)?.depth_slice(slice_index, 0)?;
        let possible_dose_mask = data
            .require(Field::PossibleDoseMask)?
            .depth_slice(slice_index, 0)?;

        let masks = data.require(Field::StructureMasks)?;
        let (rows, cols) = ct.dim();
        let mut structure_overlay = Array3::<f32>::zeros((rows, cols, 3));
        let drawn = masks.channels().unwrap_or(0).min(STRUCTURE_COLORS.len());

        for (channel, color) in STRUCTURE_COLORS.iter().enumerate().take(drawn) {
            let mask = masks.depth_slice(slice_index, channel)?;
            for ((r, c), &value) in mask.indexed_iter() {
                if value > 0.0 && r < rows && c < cols {
                    for (k, &component) in color.iter().enumerate() {
                        structure_overlay[[r, c, k]] = component;
                    }
                }
            }
        }

        let legend = data
            .structure_mask_names
            .iter()
            .zip(STRUCTURE_COLORS.iter())
            .map(|(name, color)| (name.clone(), *color))
            .collect();

        Ok(Self {
            slice_index,
            ct,
            dose,
            possible_dose_mask,
            structure_overlay,
            legend,
        })
    }
}

/// Draws a prepared slice; implemented by whatever plotting backend is in use
pub trait SliceRenderer {
    fn render(&mut self, patient_id: &str, view: &SliceView) -> Result<()>;
}

/// What an inspection did
#[derive(Debug, Clone, PartialEq)]
pub enum InspectOutcome {
    /// No patient was requested; these IDs were listed
    Listed(Vec<String>),
    /// The patient's slice was handed to the renderer
    Rendered { patient_id: String },
}

/// Inspect the container at `container_path`.
///
/// Without a patient ID the available IDs are printed to `out`. With one, the
/// patient's field shapes are printed and slice `slice_index` is rendered.
pub fn inspect<W, R>(
    container_path: impl AsRef<Path>,
    patient_id: Option<&str>,
    slice_index: usize,
    out: &mut W,
    renderer: &mut R,
) -> Result<InspectOutcome>
where
    W: Write,
    R: SliceRenderer + ?Sized,
{
    let container = Container::open(container_path)?;

    let patient_id = match patient_id {
        Some(id) => id,
        None => {
            let patients = container.list_patients();
            if patients.is_empty() {
                writeln!(out, "No patients found in the container")?;
            } else {
                writeln!(out, "Available patients:")?;
                for patient in &patients {
                    writeln!(out, "  - {}", patient)?;
                }
            }
            return Ok(InspectOutcome::Listed(patients));
        }
    };

    let data = container.read_patient(patient_id)?;
    writeln!(out, "Data for patient {}:", patient_id)?;
    for (name, array) in &data.fields {
        writeln!(out, "  {}: {}", name, format_shape(array.shape()))?;
    }
    writeln!(
        out,
        "  {}: list of {} items",
        STRUCTURE_MASK_NAMES,
        data.structure_mask_names.len()
    )?;

    let view = SliceView::extract(&data, slice_index)?;
    renderer.render(patient_id, &view)?;

    Ok(InspectOutcome::Rendered {
        patient_id: patient_id.to_string(),
    })
}
