//! Basic demonstration of the Phalanx battlefield.
//!
//! Run with: cargo run --example basic_demo
//! Set `RUST_LOG=phalanx_sim=debug` for formation events.

use phalanx_sim::{Battlefield, Faction, TerrainGrid, UnitId, UnitKind, UnitSpec, UnitState};
use std::f32::consts::PI;
use tracing_subscriber::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Phalanx - Battlefield Demo ===\n");

    // 100x100 cells, 2 units per cell = 200x200 world units centred on the origin
    let mut field = Battlefield::new().with_terrain(TerrainGrid::new_with_features(100, 100, 2.0));

    let blue_line = field.add_unit(UnitSpec::new(UnitKind::Phalanx, Faction::Blue, 12, 4).at(-20.0, 0.0, 0.0))?;
    let blue_archers =
        field.add_unit(UnitSpec::new(UnitKind::Archer, Faction::Blue, 8, 2).at(-30.0, 12.0, 0.0))?;
    let red_line =
        field.add_unit(UnitSpec::new(UnitKind::Swordsman, Faction::Red, 12, 4).at(20.0, 0.0, PI))?;
    let red_cavalry =
        field.add_unit(UnitSpec::new(UnitKind::Cavalry, Faction::Red, 6, 2).at(30.0, -15.0, PI))?;

    println!("Initial state:");
    print_units(&field, &[blue_line, blue_archers, red_line, red_cavalry]);

    println!("\n--- Advancing both lines, archers loose at the red line ---\n");
    field.move_unit(blue_line, -1.0, 0.0, 0.0)?;
    field.move_unit(red_line, 1.0, 0.0, PI)?;
    field.move_unit(red_cavalry, -5.0, -8.0, PI * 0.75)?;
    field.assign_ranged_target(blue_archers, Some(red_line))?;

    for _ in 0..600 {
        field.step();
        if field.current_tick() % 100 == 0 {
            println!("--- Tick {} ---", field.current_tick());
            print_units(&field, &[blue_line, blue_archers, red_line, red_cavalry]);
            println!(
                "  projectiles in flight: {}, fallen: {}",
                field.object_hasher().len(),
                field.dead_troops().len()
            );
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", field.snapshot().to_json_pretty()?);
    Ok(())
}

fn print_units(field: &Battlefield, ids: &[UnitId]) {
    for &id in ids {
        let Ok(unit) = field.unit(id) else { continue };
        let state = match unit.state {
            UnitState::Standing => "standing",
            UnitState::Moving => "moving",
            UnitState::Fighting => "fighting",
        };
        println!(
            "  {:?} {:?} #{}: anchor=({:.1}, {:.1}) alive={}/{} patience={} [{}]",
            unit.faction,
            unit.kind,
            id.0,
            unit.anchor.x,
            unit.anchor.y,
            unit.alive_count(),
            unit.slot_count(),
            unit.patience,
            state
        );
    }
}
