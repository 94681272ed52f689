use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use eg_calib::{
    CorrectionTable, EcalRecHit, EcalRecHitCollection, Electron, ElectronProducer, EnergyCalibrator,
    EpCombiner, Event, Photon, PhotonProducer, RecHitFlag, StreamRngRegistry,
};
use eg_core::{CalibrationMode, DetId, FourMomentum, StreamId};

const TABLE: &str = include_str!("../../../tests/fixtures/corrections_run2.json");

fn table(mode: CalibrationMode) -> Arc<CorrectionTable> {
    Arc::new(CorrectionTable::from_json_str(TABLE).unwrap().with_mode(mode))
}

fn rec_hits(n: u32) -> EcalRecHitCollection {
    EcalRecHitCollection::from(
        (0..n)
            .map(|i| {
                let hit = EcalRecHit::new(DetId(i), 10.0);
                if i % 7 == 0 { hit.with_flag(RecHitFlag::HasSwitchToGain6) } else { hit }
            })
            .collect::<Vec<_>>(),
    )
}

fn electron_event(n: usize) -> Event<Electron> {
    let candidates = (0..n)
        .map(|i| {
            let eta = 2.4 * (i as f64 / n as f64) - 1.2;
            let e = 20.0 + i as f64;
            Electron {
                sc_eta: eta,
                r9: 0.9,
                is_barrel: eta.abs() < 1.4442,
                seed_id: DetId(i as u32),
                ecal_energy: e,
                ecal_energy_error: 0.02 * e,
                track_momentum: 0.98 * e,
                track_momentum_error: 0.05 * e,
                p4: FourMomentum::from_energy_eta_phi(e, eta, 0.5),
                p4_error: 0.0,
                charge: -1,
            }
        })
        .collect();
    Event {
        run: 276000,
        stream: StreamId(0),
        is_real_data: true,
        candidates,
        rec_hits_eb: rec_hits(n as u32),
        rec_hits_ee: EcalRecHitCollection::new(),
    }
}

fn photon_event(n: usize) -> Event<Photon> {
    let candidates = (0..n)
        .map(|i| {
            let eta = 2.4 * (i as f64 / n as f64) - 1.2;
            let e = 30.0 + i as f64;
            Photon {
                sc_eta: eta,
                r9: 0.95,
                is_barrel: true,
                seed_id: DetId(i as u32),
                energy: e,
                energy_error: 0.015 * e,
                p4: FourMomentum::from_energy_eta_phi(e, eta, -1.0),
            }
        })
        .collect();
    Event {
        run: 1,
        stream: StreamId(0),
        is_real_data: false,
        candidates,
        rec_hits_eb: rec_hits(n as u32),
        rec_hits_ee: EcalRecHitCollection::new(),
    }
}

fn bench_producers(c: &mut Criterion) {
    let electrons = ElectronProducer::new(
        EnergyCalibrator::new(table(CalibrationMode::Data), CalibrationMode::Data, false),
        EpCombiner::default(),
    );
    let ele_event = electron_event(1_000);
    c.bench_function("electron_data_1k", |b| {
        b.iter(|| black_box(electrons.produce(&ele_event, None).unwrap()))
    });

    let photons = PhotonProducer::new(
        EnergyCalibrator::new(
            table(CalibrationMode::Simulation),
            CalibrationMode::Simulation,
            false,
        ),
        false,
    );
    let pho_event = photon_event(1_000);
    let registry = StreamRngRegistry::new(1);
    c.bench_function("photon_smearing_1k", |b| {
        b.iter(|| black_box(photons.produce(&pho_event, Some(&registry)).unwrap()))
    });
}

criterion_group!(benches, bench_producers);
criterion_main!(benches);
