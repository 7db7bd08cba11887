use assert_approx_eq::assert_approx_eq;
use ndarray::{s, Axis};
use num_complex::Complex64;

use superhydro::model::GpeModel;
use superhydro::potential::Trap;
use superhydro::propagator::SplitStep;
use superhydro::soc::Soc2;
use superhydro::{ModelKind, ParamValue, ParamsBuilder};

fn decoupled() -> Soc2 {
    let params = ParamsBuilder::new()
        .layer(ModelKind::Soc2.overrides())
        .unwrap()
        .layer([
            ("nx", ParamValue::Int(32)),
            ("ny", ParamValue::Int(16)),
            ("cooling_steps", ParamValue::Int(10)),
            ("cooling", ParamValue::Float(0.0)),
            ("soc_w", ParamValue::Float(0.0)),
            ("g_ab", ParamValue::Float(0.0)),
            ("finger_v0_mu", ParamValue::Float(0.0)),
        ])
        .unwrap()
        .build()
        .unwrap();
    Soc2::new(ModelKind::Soc2, params).unwrap()
}

fn with_component_cleared(model: &Soc2, component: usize) -> Soc2 {
    let mut model = model.clone();
    let core = model.core_mut();
    core.psi
        .index_axis_mut(Axis(0), component)
        .fill(Complex64::new(0.0, 0.0));
    core.capture_particle_number();
    model
}

#[test]
fn uncoupled_components_evolve_independently() {
    let mut full = decoupled();
    // Without coupling the relaxed state is fully polarised. Fill both
    // components with structured data so the evolution is not trivial.
    let x = full.core().grid.axis_values(0);
    let lx = full.core().lxy().0;
    let k = 2.0 * std::f64::consts::PI / lx;
    let amplitude = full.density().mean().unwrap().sqrt();
    full.core_mut().psi.indexed_iter_mut().for_each(|(idx, y)| {
        let x = x[idx[1]];
        *y = match idx[0] {
            0 => amplitude * (1.0 + 0.3 * (k * x).cos()) * Complex64::new(0.0, 2.0 * k * x).exp(),
            _ => amplitude * (1.0 + 0.5 * (2.0 * k * x).sin()) * Complex64::new(0.0, -k * x).exp(),
        };
    });
    full.core_mut().capture_particle_number();

    let mut only_a = with_component_cleared(&full, 1);
    let mut only_b = with_component_cleared(&full, 0);

    for model in [&mut full, &mut only_a, &mut only_b] {
        model.step(20, None);
    }

    let psi = &full.core().psi;
    let scale = psi.iter().fold(0.0_f64, |acc, y| acc.max(y.norm()));
    for (y, y_a) in psi.slice(s![0, .., ..]).iter().zip(only_a.core().psi.slice(s![0, .., ..])) {
        assert_approx_eq!((y - y_a).norm() / scale, 0.0, 1e-9);
    }
    for (y, y_b) in psi.slice(s![1, .., ..]).iter().zip(only_b.core().psi.slice(s![1, .., ..])) {
        assert_approx_eq!((y - y_b).norm() / scale, 0.0, 1e-9);
    }
    assert!(only_a.core().psi.slice(s![1, .., ..]).iter().all(|y| y.norm() == 0.0));
}

#[test]
fn spin_densities_add_up_to_the_total() {
    let model = decoupled();
    let (a, b) = model.spin_densities().unwrap();
    let total = model.density();
    for ((a, b), n) in a.iter().zip(b.iter()).zip(total.iter()) {
        assert_approx_eq!(a + b, *n, 1e-12 * n.max(1.0));
    }
}

#[test]
fn super_solid_lattice_is_commensurate() {
    let params = ParamsBuilder::new()
        .layer(ModelKind::SuperSolid2.overrides())
        .unwrap()
        .layer([
            ("nx", ParamValue::Int(64)),
            ("ny", ParamValue::Int(8)),
            ("cooling_steps", ParamValue::Int(5)),
        ])
        .unwrap()
        .build()
        .unwrap();
    let model = Soc2::new(ModelKind::SuperSolid2, params).unwrap();
    let Trap::Lattice { k_l, v0, .. } = model.core().trap else {
        panic!("expected a lattice trap");
    };
    let cells = k_l * model.core().lxy().0 / 2.0 / std::f64::consts::PI;
    assert_approx_eq!(cells, cells.round(), 1e-9);
    assert!(cells >= 1.0);
    assert_approx_eq!(v0, 0.1 * model.core().mu, 1e-12);
    assert!(model.recoil_momentum() > 0.0);
}
