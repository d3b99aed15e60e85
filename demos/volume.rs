//! Area of the unit square from the mass operator: `1^T M 1`.
//!
//! Pick the backend with `BRINY_FEM_RESOURCE` (default `/cpu/self`) and the log
//! level with `RUST_LOG`.

use std::time::Instant;

use briny_fem::prelude::*;
use tracing_subscriber::EnvFilter;

/// Element-to-node map of a uniform `n x n` quad mesh with `p x p` nodes per element.
fn mesh(n: usize, p: usize) -> (Vec<usize>, usize) {
    let n1d = n * (p - 1) + 1;
    let mut indices = Vec::with_capacity(n * n * p * p);
    for ey in 0..n {
        for ex in 0..n {
            for iy in 0..p {
                for ix in 0..p {
                    indices.push((ey * (p - 1) + iy) * n1d + ex * (p - 1) + ix);
                }
            }
        }
    }
    (indices, n1d * n1d)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // elements per side and nodes per element side
    let (n, p, q) = (16, 4, 5);

    let ctx = Context::from_env()?;
    println!("resource {} -> backend {}", ctx.resource(), ctx.backend_name());

    let (indices, nnodes) = mesh(n, p);
    let r = ctx.elem_restriction(n * n, p * p, 1, nnodes, IndexSource::Own(indices))?;
    let b = ctx.basis_tensor_h1_lagrange(2, 1, p, q, QuadMode::Gauss)?;

    // reference square [-1, 1]^2 mapped onto an element of side 1/n
    let jacobian = 1.0 / (4.0 * (n * n) as Scalar);
    let mut qf = ctx.q_function_interior(move |nq, inputs, outputs| {
        for i in 0..nq {
            outputs[0][i] = inputs[0][i] * inputs[1][i] * jacobian;
        }
        Ok(())
    });
    qf.add_input("u", 1, EvalMode::Interp)?;
    qf.add_input("weight", 1, EvalMode::Weight)?;
    qf.add_output("v", 1, EvalMode::Interp)?;

    let mut mass = ctx.operator(&qf, &r, &b)?;
    let mut ones = ctx.vector(nnodes)?;
    ones.set_value(1.0)?;
    let mut y = ctx.vector(nnodes)?;

    let start = Instant::now();
    let mut request = Request::Immediate;
    mass.apply(&mut ones, &mut y, &mut request)?;
    request.wait()?;
    let elapsed = start.elapsed();

    let area: Scalar = y.to_vec()?.iter().sum();
    println!("{} elements, {nnodes} nodes", n * n);
    println!("area = {area:.15} (error {:.3e}) in {elapsed:?}", (area - 1.0).abs());
    if let Some(stats) = ctx.transfer_stats() {
        println!("transfers: {} host->device, {} device->host", stats.host_to_device, stats.device_to_host);
    }
    Ok(())
}
