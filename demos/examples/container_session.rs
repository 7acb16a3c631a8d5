// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared stimulus container.
//!
//! A writer thread moves and removes stimuli while a reader queries handles and
//! copies records out inside a remove session.
//!
//! Run:
//! - `cargo run -p percept_demos --example container_session`

use std::sync::Arc;
use std::thread;

use percept_container::{ContainerConfig, Region, SenseContainer, SensedStimulus, TreeKind};
use percept_tree::Aabb;

fn cube(x: f64, y: f64, z: f64) -> Aabb<f64, 3> {
    Aabb::around([x, y, z], 1.0)
}

fn main() {
    let container = Arc::new(SenseContainer::new(ContainerConfig {
        kind: TreeKind::Oct,
        min_cell_size: 25.0,
        ..ContainerConfig::default()
    }));

    let ids: Vec<_> = (0..200_u64)
        .map(|i| {
            let channels = if i % 2 == 0 { 0b01 } else { 0b10 };
            let x = (i % 20) as f64 * 10.0;
            let y = (i / 20) as f64 * 10.0;
            container.insert(SensedStimulus::new(i, channels).with_age(2.0), cube(x, y, 0.0))
        })
        .collect();
    println!("{} stimuli in {} cells", container.len(), container.node_count());

    let writer = {
        let container = Arc::clone(&container);
        let ids = ids.clone();
        thread::spawn(move || {
            for (step, id) in ids.iter().enumerate() {
                if step % 3 == 0 {
                    container.remove(*id);
                } else {
                    let x = (step % 20) as f64 * 10.0 + 3.0;
                    container.update(*id, cube(x, 50.0, 5.0));
                }
            }
        })
    };

    let region = Region::BoxSphere {
        bounds: Aabb::new([0.0, 0.0, -10.0], [100.0, 100.0, 10.0]),
        center: [50.0, 50.0, 0.0],
        radius: 60.0,
    };
    let mut copied = 0;
    let mut vanished = 0;
    for _ in 0..50 {
        let session = container.remove_session();
        for id in container.query_ids(&region, 0b01) {
            // A handle removed after the query reports `None`, never another record.
            match container.sensed_copy_ts(id) {
                Some(record) => {
                    assert_eq!(record.channels & 0b01, 0b01);
                    copied += 1;
                }
                None => vanished += 1,
            }
        }
        drop(session);
    }
    writer.join().expect("writer thread finished");

    println!("copied {copied} records, {vanished} vanished mid-session");
    assert!(container.is_remove_control_clear());
    container.collapse();
    println!("{} stimuli left in {} cells", container.len(), container.node_count());

    if let Some(cell) = container.max_intersect(&Aabb::new([0.0; 3], [30.0; 3])) {
        println!("smallest cell covering the corner: {cell:?}");
    }
}
