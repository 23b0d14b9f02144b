// tests/field_pipeline.rs
//
// End-to-end checks of the field path: .gda files on disk through the
// windowed reader into derived quantities and reduced spectra.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use pic_post::canonical::vector_potential_y;
use pic_post::derived;
use pic_post::gda::{FieldWindow, GdaReader};
use pic_post::pic_info::PicInfo;
use pic_post::power_spectrum::power_spectrum_x;

fn small_run_info() -> PicInfo {
    PicInfo {
        nx: 32,
        ny: 1,
        nz: 16,
        lx_di: 32.0,
        ly_di: 1.0,
        lz_di: 16.0,
        dx_di: 1.0,
        dy_di: 1.0,
        dz_di: 1.0,
        mime: 25.0,
        nppc: 100.0,
        b0: 1.0,
        vthe: 0.1,
        dtwpe: 0.1,
        dtwce: 0.02,
        fields_interval: 100,
        particle_interval: 1000,
        dt_fields: 2.5,
        dt_particles: 25.0,
        ntf: 1,
        ntp: 1,
        topology_x: 2,
        topology_y: 1,
        topology_z: 2,
    }
}

fn write_gda(path: &Path, info: &PicInfo, f: impl Fn(usize, usize) -> f32) {
    let mut file = File::create(path).unwrap();
    for k in 0..info.nz {
        for i in 0..info.nx {
            file.write_all(&f(i, k).to_le_bytes()).unwrap();
        }
    }
}

#[test]
fn vector_potential_from_disk_fields_is_linear() {
    let info = small_run_info();
    let dir = tempfile::tempdir().unwrap();
    write_gda(&dir.path().join("bx.gda"), &info, |_, _| 0.5);
    write_gda(&dir.path().join("bz.gda"), &info, |_, _| 2.0);

    let win = FieldWindow::full(&info);
    let bx = GdaReader::open(&dir.path().join("bx.gda"), &info)
        .unwrap()
        .read_frame(0, &win)
        .unwrap();
    let bz = GdaReader::open(&dir.path().join("bz.gda"), &info)
        .unwrap()
        .read_frame(0, &win)
        .unwrap();

    let ay = vector_potential_y(&bx, &bz);
    // Ay = 2 x - 0.5 z relative to the bottom-left corner.
    for k in 0..info.nz {
        for i in 0..info.nx {
            let expect = 2.0 * (i as f64 * info.dx_di) - 0.5 * (k as f64 * info.dz_di);
            assert!((ay.at(i, k) - expect).abs() < 1e-9, "at ({}, {})", i, k);
        }
    }
}

#[test]
fn epara_eperp_from_disk_fields() {
    let info = small_run_info();
    let dir = tempfile::tempdir().unwrap();
    // B along x, E = (1, 0, 2): Epara = 1, Eperp = 2.
    write_gda(&dir.path().join("bx.gda"), &info, |_, _| 3.0);
    write_gda(&dir.path().join("bz.gda"), &info, |_, _| 0.0);
    write_gda(&dir.path().join("ex.gda"), &info, |_, _| 1.0);
    write_gda(&dir.path().join("ez.gda"), &info, |_, _| 2.0);

    let win = FieldWindow::full(&info);
    let read = |name: &str| {
        GdaReader::open(&dir.path().join(format!("{}.gda", name)), &info)
            .unwrap()
            .read_frame(0, &win)
            .unwrap()
    };
    let zero = read("bz").map(|_| 0.0);
    let b = [read("bx"), zero.clone(), read("bz")];
    let e = [read("ex"), zero, read("ez")];

    let (para, perp) = derived::epara_eperp(&e, &b);
    for n in 0..para.data.len() {
        assert!((para.data[n] - 1.0).abs() < 1e-9);
        assert!((perp.data[n] - 2.0).abs() < 1e-9);
    }
}

#[test]
fn power_spectrum_of_disk_sine_peaks_at_its_mode() {
    let info = small_run_info();
    let dir = tempfile::tempdir().unwrap();
    let m = 3.0;
    write_gda(&dir.path().join("by.gda"), &info, |i, _| {
        (2.0 * std::f32::consts::PI * m as f32 * i as f32 / 32.0).sin()
    });

    let by = GdaReader::open(&dir.path().join("by.gda"), &info)
        .unwrap()
        .read_frame(0, &FieldWindow::full(&info))
        .unwrap();
    let spec = power_spectrum_x(&by);
    let imax = spec
        .power
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    assert_eq!(imax, 3);
}
