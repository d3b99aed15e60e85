use briny_fem::backend::{Backend, CapabilityTable, ObjectKind};
use briny_fem::prelude::*;
use briny_fem::registry::{Registry, register_backend, reset_registry};

/// A backend that implements nothing but its name.
#[derive(Debug, Default)]
struct Minimal {
    capabilities: CapabilityTable,
}

impl Backend for Minimal {
    fn name(&self) -> &str {
        "minimal"
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }
}

fn init_minimal(_: &str) -> Result<Box<dyn Backend>> {
    Ok(Box::new(Minimal::default()))
}

#[test]
fn test_missing_capabilities_report_unsupported() {
    let mut registry = Registry::new();
    registry.register("/test/minimal", init_minimal).unwrap();
    let ctx = Context::init_with(&registry, "/test/minimal").unwrap();
    ctx.set_error_handler(ErrorHandler::Return);
    assert!(!ctx.supports(ObjectKind::Vector, "Create"));
    assert!(matches!(
        ctx.vector(3),
        Err(FemError::UnsupportedOperation { kind: ObjectKind::Vector, op: "Create" })
    ));
    assert!(matches!(
        ctx.elem_restriction(1, 1, 1, 1, IndexSource::Copy(&[0])),
        Err(FemError::UnsupportedOperation { kind: ObjectKind::ElemRestriction, .. })
    ));
}

#[test]
fn test_most_specific_prefix_is_selected() {
    let mut registry = Registry::new();
    registry.register("/gpu", init_minimal).unwrap();
    registry.register("/gpu/accel", init_minimal).unwrap();
    assert_eq!(registry.resolve("/gpu/accel/x").unwrap().prefix(), "/gpu/accel");
}

#[test]
fn test_builtin_resources() {
    assert_eq!(Context::init("/cpu/self").unwrap().backend_name(), "ref");
    assert_eq!(Context::init("/cpu/self/ref").unwrap().backend_name(), "ref");
    assert_eq!(Context::init("/cpu/self/opt").unwrap().backend_name(), "opt");
    let gpu = Context::init("/gpu/emulated").unwrap();
    assert_eq!(gpu.backend_name(), "emulated");
    assert_eq!(gpu.preferred_mem_type(), MemType::Device);
    assert!(gpu.transfer_stats().is_some());
}

#[test]
fn test_bad_resources_fail_to_init() {
    assert!(matches!(Context::init(""), Err(FemError::NoResource)));
    assert!(matches!(Context::init("tpu"), Err(FemError::NoBackendFound(_))));
    assert!(matches!(Context::init("/cpu/selfish"), Err(FemError::InvalidResource { .. })));
}

#[cfg(not(feature = "wgpu"))]
#[test]
fn test_compiled_out_backend_is_skipped() {
    let registry = Registry::with_builtin();
    assert!(registry.entries().iter().all(|e| e.prefix() != "/gpu/wgpu"));
    // falls through to the closest registered prefix, which declines it
    let err = Context::init_with(&registry, "/gpu/wgpu").unwrap_err();
    assert!(matches!(err, FemError::InvalidResource { ref backend, .. } if backend == "emulated"));
}

#[test]
fn test_registered_backend_is_visible_to_init() {
    register_backend("/test/global/minimal", init_minimal).unwrap();
    let ctx = Context::init("/test/global/minimal").unwrap();
    assert_eq!(ctx.backend_name(), "minimal");

    // only the leading "/" is left in common, which the reference backend declines
    reset_registry();
    assert!(matches!(
        Context::init("/test/global/minimal"),
        Err(FemError::InvalidResource { ref backend, .. }) if backend == "ref"
    ));
}

#[test]
fn test_capability_table_is_inspectable() {
    let ctx = Context::init("/cpu/self").unwrap();
    let ops: Vec<_> = ctx.capabilities().operations(ObjectKind::Basis).collect();
    assert_eq!(ops, ["Create", "Apply"]);
    assert!(ctx.supports(ObjectKind::Operator, "Apply"));
}

#[test]
fn test_from_env_defaults_to_host_reference() {
    if std::env::var(briny_fem::context::RESOURCE_ENV).is_ok() {
        return;
    }
    let ctx = Context::from_env().unwrap();
    assert_eq!(ctx.resource(), briny_fem::context::DEFAULT_RESOURCE);
    assert_eq!(ctx.backend_name(), "ref");
}
