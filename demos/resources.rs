//! Lists the built-in resources and what each backend implements.

use briny_fem::backend::ObjectKind;
use briny_fem::prelude::*;
use briny_fem::registry::Registry;
use tracing_subscriber::EnvFilter;

const KINDS: [ObjectKind; 5] = [
    ObjectKind::Vector,
    ObjectKind::ElemRestriction,
    ObjectKind::Basis,
    ObjectKind::QFunction,
    ObjectKind::Operator,
];

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let registry = Registry::with_builtin();
    for entry in registry.entries() {
        match Context::init_with(&registry, entry.prefix()) {
            Ok(ctx) => {
                println!("{} ({}, prefers {:?} memory)", entry.prefix(), ctx.backend_name(), ctx.preferred_mem_type());
                for kind in KINDS {
                    let ops: Vec<_> = ctx.capabilities().operations(kind).collect();
                    println!("    {kind:<16} {}", ops.join(" "));
                }
            }
            Err(err) => println!("{} unavailable: {err}", entry.prefix()),
        }
    }
}
