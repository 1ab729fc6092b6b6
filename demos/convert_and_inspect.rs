//! Example: Convert a synthetic two-patient dataset and inspect it
//!
//! Run with: RUST_LOG=info cargo run --example convert_and_inspect

use kbpack::{
    inspect::DEFAULT_SLICE_INDEX, metadata::OPENKBP_ROIS, ConverterConfig, MemoryLoader,
    PatientSample, SliceRenderer, SliceView, VolumeArray, VolumeShape,
};
use ndarray::Array2;

/// Prints the value range of each panel instead of drawing it
struct RangeRenderer;

fn value_range(panel: &Array2<f64>) -> (f64, f64) {
    panel
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

impl SliceRenderer for RangeRenderer {
    fn render(&mut self, patient_id: &str, view: &SliceView) -> kbpack::Result<()> {
        println!("\nSlice {} of patient {}:", view.slice_index, patient_id);
        for (name, panel) in [
            ("CT", &view.ct),
            ("Dose", &view.dose),
            ("Possible Dose Mask", &view.possible_dose_mask),
        ] {
            let (lo, hi) = value_range(panel);
            println!("  {:<20} min {:>8.2}  max {:>8.2}", name, lo, hi);
        }
        let covered = view
            .structure_overlay
            .outer_iter()
            .flat_map(|row| row.outer_iter().map(|px| px.sum() > 0.0).collect::<Vec<_>>())
            .filter(|&lit| lit)
            .count();
        println!("  Structure overlay: {} pixels covered", covered);
        for (name, color) in &view.legend {
            println!("    {:<14} rgb{:?}", name, color);
        }
        Ok(())
    }
}

/// A spherical target inside a 128^3 volume with a dose falling off from its centre
fn synthetic_patient(id: &str, radius: f32) -> anyhow::Result<PatientSample> {
    let dims = *VolumeShape::OPENKBP.dims();
    let [depth, rows, cols] = dims;
    let rois = ["PTV70", "SpinalCord"];
    let centre = 64.0f32;

    let mut dose = Vec::with_capacity(depth * rows * cols);
    let mut ct = Vec::with_capacity(depth * rows * cols);
    let mut masks = Vec::with_capacity(depth * rows * cols * rois.len());
    for z in 0..depth {
        for y in 0..rows {
            for x in 0..cols {
                let (dz, dy, dx) = (z as f32 - centre, y as f32 - centre, x as f32 - centre);
                let distance = (dz * dz + dy * dy + dx * dx).sqrt();
                dose.push((70.0 - distance).max(0.0));
                ct.push(if distance < 50.0 { 40i16 } else { -1000 });
                masks.push(u8::from(distance < radius));
                masks.push(u8::from((dy - 30.0).abs() < 4.0 && dx.abs() < 4.0));
            }
        }
    }

    Ok(PatientSample {
        id: id.to_string(),
        dose: VolumeArray::from_shape_vec(&[depth, rows, cols, 1], dose)?,
        ct: VolumeArray::from_shape_vec(&[depth, rows, cols, 1], ct)?,
        structure_masks: VolumeArray::from_shape_vec(&[depth, rows, cols, rois.len()], masks)?,
        possible_dose_mask: VolumeArray::from_shape_vec(
            &[depth, rows, cols, 1],
            vec![1u8; depth * rows * cols],
        )?,
        voxel_dimensions: VolumeArray::from_shape_vec(&[3], vec![3.906f32, 3.906, 2.5])?,
        structure_mask_names: rois.iter().map(|s| s.to_string()).collect(),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let temp_dir = tempfile::tempdir()?;
    let input_dir = temp_dir.path().join("provided-data");
    std::fs::create_dir_all(&input_dir)?;

    let loader = MemoryLoader::new(OPENKBP_ROIS.iter().map(|s| s.to_string()).collect())
        .with_patient(synthetic_patient("pt_1", 20.0)?)
        .with_patient(synthetic_patient("pt_2", 12.0)?);

    let config = ConverterConfig::new(temp_dir.path().join("converted"));
    let path = kbpack::convert_directory_with(&input_dir, config, |_| Ok(loader))?;
    println!(
        "Container written to {} ({})",
        path.display(),
        kbpack::utils::format_bytes(std::fs::metadata(&path)?.len())
    );

    let mut stdout = std::io::stdout();
    kbpack::inspect(&path, None, DEFAULT_SLICE_INDEX, &mut stdout, &mut RangeRenderer)?;
    println!();
    kbpack::inspect(
        &path,
        Some("pt_1"),
        DEFAULT_SLICE_INDEX,
        &mut stdout,
        &mut RangeRenderer,
    )?;

    Ok(())
}
