use assert_cmd::cargo::cargo_bin_cmd;

use scopesweep::config::{FreqScale, SweepConfig};
use scopesweep::scpi::{Generator, Scope, SimLink};
use scopesweep::sweep::{self, InterruptFlag, Pacing};

/// Sweep the simulated RC low-pass and check the response looks like one.
#[test]
fn simulated_rc_sweep_shows_the_expected_rolloff() {
    let cutoff_hz = 1000.0;
    let (gen_link, scope_link) = SimLink::rc_bench(cutoff_hz);
    let mut gen = Generator::new(gen_link);
    let mut scope = Scope::new(scope_link);

    let config = SweepConfig {
        f_start_hz: 10.0,
        f_stop_hz: 100_000.0,
        num_points: 9,
        scale: FreqScale::Log,
        num_averages: 2,
        ..SweepConfig::default()
    };
    let result = sweep::run_sweep(
        &mut gen,
        &mut scope,
        &config,
        &Pacing::none(),
        &InterruptFlag::new(),
    )
    .unwrap();

    assert_eq!(result.points.len(), 9);

    // Passband is flat, the cutoff sits 3 dB down, and the phase heads
    // toward -90 degrees well above the cutoff.
    let first = &result.points[0];
    assert!(first.magnitude_db.abs() < 0.1, "passband was {} dB", first.magnitude_db);
    let at_cutoff = result
        .points
        .iter()
        .min_by(|a, b| {
            (a.frequency_hz - cutoff_hz)
                .abs()
                .total_cmp(&(b.frequency_hz - cutoff_hz).abs())
        })
        .unwrap();
    assert!((at_cutoff.magnitude_db - (-3.01)).abs() < 0.1);
    let last = result.points.last().unwrap();
    assert!(last.magnitude_db < -30.0);
    assert!(last.phase_deg < -85.0 && last.phase_deg > -95.0);
}

#[test]
fn bode_sim_run_writes_csv_and_plot() {
    let dir = tempfile::tempdir().unwrap();

    cargo_bin_cmd!("scopesweep")
        .args(["bode", "--sim", "--yes"])
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("Sweep finished"));

    let csv = dir.path().join("DATA/BODE_data_001.csv");
    let png = dir.path().join("DATA/PLOTS/BODE_plot_001.png");
    assert!(csv.exists());
    assert!(png.exists());

    let text = std::fs::read_to_string(&csv).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Frequency (Hz),Magnitude (dB),Phase (deg)"
    );
    // Default configuration sweeps 20 points and the simulator answers
    // every one, so every row parses as three numbers.
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 20);
    for row in rows {
        let fields: Vec<f64> = row.split(',').map(|f| f.parse().unwrap()).collect();
        assert_eq!(fields.len(), 3);
    }
}

#[test]
fn spectrum_sim_run_writes_csv_and_plot() {
    let dir = tempfile::tempdir().unwrap();

    cargo_bin_cmd!("scopesweep")
        .args(["spectrum", "--sim", "--yes"])
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("Analysis finished"));

    let csv = dir.path().join("DATA/SPECTRUM_data_001.csv");
    assert!(csv.exists());
    assert!(dir.path().join("DATA/PLOTS/SPECTRUM_plot_001.png").exists());

    // The simulated generator idles at 1 kHz, which must dominate the
    // spectrum.
    let text = std::fs::read_to_string(&csv).unwrap();
    let mut best = (0.0f64, f64::MIN);
    for line in text.lines().skip(1) {
        let fields: Vec<f64> = line.split(',').map(|f| f.parse().unwrap()).collect();
        if fields[1] > best.1 {
            best = (fields[0], fields[1]);
        }
    }
    assert_eq!(best.0, 1000.0);
}

#[test]
fn second_run_gets_the_next_numbered_filename() {
    let dir = tempfile::tempdir().unwrap();

    for _ in 0..2 {
        cargo_bin_cmd!("scopesweep")
            .args(["bode", "--sim", "--yes"])
            .current_dir(dir.path())
            .assert()
            .success();
    }
    assert!(dir.path().join("DATA/BODE_data_001.csv").exists());
    assert!(dir.path().join("DATA/BODE_data_002.csv").exists());
}

#[test]
fn help_lists_the_three_tools() {
    cargo_bin_cmd!("scopesweep")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("bode"))
        .stdout(predicates::str::contains("spectrum"))
        .stdout(predicates::str::contains("console"));
}
