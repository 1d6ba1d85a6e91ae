use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::spectrum::SpectrumResult;
use crate::sweep::SweepResult;

pub const DATA_DIR: &str = "DATA";
pub const PLOTS_SUBDIR: &str = "PLOTS";

/// Create (if needed) and return the data and plot directories under `base`.
pub fn ensure_dirs(base: &Path) -> Result<(PathBuf, PathBuf)> {
    let data = base.join(DATA_DIR);
    let plots = data.join(PLOTS_SUBDIR);
    fs::create_dir_all(&plots)
        .with_context(|| format!("failed to create '{}'", plots.display()))?;
    Ok((data, plots))
}

/// First free `PREFIX_NNN.ext` in `dir`, numbering from 001.
pub fn next_numbered_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let mut i = 1u32;
    loop {
        let candidate = dir.join(format!("{prefix}_{i:03}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

pub fn save_bode_csv(result: &SweepResult, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "Frequency (Hz),Magnitude (dB),Phase (deg)")?;
    for point in &result.points {
        writeln!(
            w,
            "{},{},{}",
            point.frequency_hz, point.magnitude_db, point.phase_deg
        )?;
    }
    w.flush()?;
    println!("Data saved to '{}'.", path.display());
    Ok(())
}

pub fn save_spectrum_csv(result: &SpectrumResult, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "Frequency (Hz),Amplitude (Vrms),Amplitude (dB)")?;
    for i in 0..result.frequencies_hz.len() {
        writeln!(
            w,
            "{},{},{}",
            result.frequencies_hz[i], result.v_rms[i], result.v_db[i]
        )?;
    }
    w.flush()?;
    println!("Data saved to '{}'.", path.display());
    Ok(())
}

pub fn save_png(bytes: &[u8], path: &Path) -> Result<()> {
    fs::write(path, bytes)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    println!("Plot saved to '{}'.", path.display());
    Ok(())
}
