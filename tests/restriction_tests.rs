use std::sync::Arc;

use briny_fem::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn ctx(resource: &str) -> Context {
    let ctx = Context::init(resource).unwrap();
    ctx.set_error_handler(ErrorHandler::Return);
    ctx
}

fn dot(a: &[Scalar], b: &[Scalar]) -> Scalar {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn test_gather_and_scatter_add_on_shared_node() {
    let ctx = ctx("/cpu/self");
    let r = ctx.elem_restriction(2, 2, 1, 3, IndexSource::Copy(&[0, 1, 1, 2])).unwrap();
    let mut global = ctx.vector_from_slice(&[10.0, 20.0, 30.0]).unwrap();
    let mut local = r.create_evector().unwrap();
    let mut request = Request::Immediate;
    r.apply(TransposeMode::NoTranspose, &mut global, &mut local, &mut request).unwrap();
    assert_eq!(local.to_vec().unwrap(), vec![10.0, 20.0, 20.0, 30.0]);
    assert!(request.is_complete());

    let mut ones = ctx.vector_from_slice(&[1.0; 4]).unwrap();
    let mut out = r.create_lvector().unwrap();
    out.set_value(0.0).unwrap();
    r.apply(TransposeMode::Transpose, &mut ones, &mut out, &mut request).unwrap();
    assert_eq!(out.to_vec().unwrap(), vec![1.0, 2.0, 1.0]);
}

#[test]
fn test_transpose_accumulates_into_existing_values() {
    let ctx = ctx("/cpu/self");
    let r = ctx.elem_restriction(2, 2, 1, 3, IndexSource::Own(vec![0, 1, 1, 2])).unwrap();
    let mut local = ctx.vector_from_slice(&[1.0, 1.0, 1.0, 1.0]).unwrap();
    let mut out = ctx.vector_from_slice(&[5.0, 5.0, 5.0]).unwrap();
    r.apply(TransposeMode::Transpose, &mut local, &mut out, &mut Request::Immediate).unwrap();
    assert_eq!(out.to_vec().unwrap(), vec![6.0, 7.0, 6.0]);
}

#[test]
fn test_transpose_is_the_adjoint() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for resource in ["/cpu/self/ref", "/cpu/self/opt", "/gpu/emulated"] {
        let ctx = ctx(resource);
        let (nelem, elemsize, ncomp, nnodes) = (6, 4, 2, 11);
        let indices: Vec<usize> = (0..nelem * elemsize).map(|_| rng.random_range(0..nnodes)).collect();
        let r = ctx
            .elem_restriction(nelem, elemsize, ncomp, nnodes * ncomp, IndexSource::Copy(&indices))
            .unwrap();
        let u: Vec<Scalar> = (0..r.lsize()).map(|_| rng.random_range(-1.0..1.0)).collect();
        let w: Vec<Scalar> = (0..nelem * elemsize * ncomp).map(|_| rng.random_range(-1.0..1.0)).collect();

        let mut uv = ctx.vector_from_slice(&u).unwrap();
        let mut ru = r.create_evector().unwrap();
        r.apply(TransposeMode::NoTranspose, &mut uv, &mut ru, &mut Request::Immediate).unwrap();

        let mut wv = ctx.vector_from_slice(&w).unwrap();
        let mut rtw = r.create_lvector().unwrap();
        rtw.set_value(0.0).unwrap();
        r.apply(TransposeMode::Transpose, &mut wv, &mut rtw, &mut Request::Immediate).unwrap();

        let lhs = dot(&ru.to_vec().unwrap(), &w);
        let rhs = dot(&u, &rtw.to_vec().unwrap());
        assert!((lhs - rhs).abs() < 1e-12, "{resource}: {lhs} vs {rhs}");
    }
}

#[test]
fn test_multi_component_layout() {
    let ctx = ctx("/cpu/self");
    let r = ctx.elem_restriction(1, 2, 3, 6, IndexSource::Copy(&[1, 0])).unwrap();
    // node 0 = (0, 1, 2), node 1 = (3, 4, 5)
    let mut global = ctx.vector_from_slice(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    let mut local = r.create_evector().unwrap();
    r.apply(TransposeMode::NoTranspose, &mut global, &mut local, &mut Request::Immediate).unwrap();
    assert_eq!(local.to_vec().unwrap(), vec![3.0, 0.0, 4.0, 1.0, 5.0, 2.0]);
}

#[test]
fn test_shared_indices_and_validation() {
    let ctx = ctx("/cpu/self");
    let shared: Arc<[usize]> = Arc::from(vec![0, 1, 1, 2]);
    let r = ctx.elem_restriction(2, 2, 1, 3, IndexSource::Use(Arc::clone(&shared))).unwrap();
    assert_eq!(Arc::strong_count(&shared), 2);
    drop(r);
    assert_eq!(Arc::strong_count(&shared), 1);

    assert!(matches!(
        ctx.elem_restriction(2, 2, 1, 3, IndexSource::Copy(&[0, 1, 1, 3])),
        Err(FemError::IndexOutOfRange { index: 3, .. })
    ));
    let r = ctx.elem_restriction(2, 2, 1, 3, IndexSource::Copy(&[0, 1, 1, 2])).unwrap();
    let mut short = ctx.vector(2).unwrap();
    let mut local = r.create_evector().unwrap();
    assert!(r.apply(TransposeMode::NoTranspose, &mut short, &mut local, &mut Request::Immediate).is_err());
}

#[test]
fn test_invalid_restriction_input_is_rejected() {
    let ctx = ctx("/cpu/self");
    assert!(matches!(
        ctx.elem_restriction(1, 1, 1, 3, IndexSource::Copy(&[usize::MAX])),
        Err(FemError::IndexOutOfRange { position: 0, index: usize::MAX, lsize: 3 })
    ));
    assert!(matches!(
        ctx.elem_restriction(usize::MAX, 2, 1, 3, IndexSource::Copy(&[0, 1])),
        Err(FemError::InvalidArgument(_))
    ));
    assert!(matches!(
        ctx.elem_restriction(2, 2, 1, 3, IndexSource::Copy(&[0, 1, 2])),
        Err(FemError::DimensionMismatch { expected: 4, actual: 3, .. })
    ));
    assert!(matches!(
        ctx.elem_restriction(2, 2, 0, 3, IndexSource::Copy(&[0, 1, 1, 2])),
        Err(FemError::InvalidArgument(_))
    ));
    // node 1 with two components needs a global length of at least 4
    assert!(matches!(
        ctx.elem_restriction(1, 2, 2, 3, IndexSource::Copy(&[0, 1])),
        Err(FemError::IndexOutOfRange { position: 1, index: 1, lsize: 3 })
    ));
}
