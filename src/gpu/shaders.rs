//! WGSL compute kernels.
//!
//! All kernels live in one module and share one bind group: the storage
//! arena (read-write) at binding 0 and a dynamic-offset [`KernelUniforms`]
//! block at binding 1. Each mirrors the CPU kernel of the same name.
//!
//! Large dispatches are split across the y dimension; [`thread_index`]
//! flattens `(x, y)` back into one element index.
//!
//! [`KernelUniforms`]: super::KernelUniforms
//! [`thread_index`]: KERNELS_SHADER

pub const KERNELS_SHADER: &str = r#"
struct KernelUniforms {
    rows: u32,
    inner: u32,
    cols: u32,
    count: u32,
    out_off: u32,
    a_off: u32,
    b_off: u32,
    c_off: u32,
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    correction1: f32,
    correction2: f32,
    w0: f32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read_write> arena: array<f32>;
@group(0) @binding(1) var<uniform> u: KernelUniforms;

const WORKGROUP_SIZE: u32 = 64u;

fn thread_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {
    return gid.y * groups.x * WORKGROUP_SIZE + gid.x;
}

// C[i, j] = sum_k A[i, k] * B[k, j]
@compute @workgroup_size(64)
fn matmul(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    let i = idx / u.cols;
    let j = idx % u.cols;
    var acc = 0.0;
    for (var k = 0u; k < u.inner; k = k + 1u) {
        acc = acc + arena[u.a_off + i * u.inner + k] * arena[u.b_off + k * u.cols + j];
    }
    arena[u.out_off + idx] = acc;
}

// C[i, j] = sum_k A[i, k] * B[j, k]
@compute @workgroup_size(64)
fn matmul_transposed_right(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    let i = idx / u.cols;
    let j = idx % u.cols;
    var acc = 0.0;
    for (var k = 0u; k < u.inner; k = k + 1u) {
        acc = acc + arena[u.a_off + i * u.inner + k] * arena[u.b_off + j * u.inner + k];
    }
    arena[u.out_off + idx] = acc;
}

// C[i, j] = sum_k A[k, i] * B[k, j]
@compute @workgroup_size(64)
fn matmul_transposed_left(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    let i = idx / u.cols;
    let j = idx % u.cols;
    var acc = 0.0;
    for (var k = 0u; k < u.inner; k = k + 1u) {
        acc = acc + arena[u.a_off + k * u.rows + i] * arena[u.b_off + k * u.cols + j];
    }
    arena[u.out_off + idx] = acc;
}

@compute @workgroup_size(64)
fn add_bias(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    arena[u.out_off + idx] = arena[u.a_off + idx] + arena[u.b_off + idx / u.cols];
}

@compute @workgroup_size(64)
fn sin_activation(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    arena[u.out_off + idx] = sin(u.w0 * arena[u.a_off + idx]);
}

// a: pre-activation, b: gradient of the activation output
@compute @workgroup_size(64)
fn sin_grad(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    arena[u.out_off + idx] = u.w0 * cos(u.w0 * arena[u.a_off + idx]) * arena[u.b_off + idx];
}

// One thread per row; accumulates into out.
@compute @workgroup_size(64)
fn bias_grad(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = thread_index(gid, groups);
    if (i >= u.rows) {
        return;
    }
    var sum = 0.0;
    for (var j = 0u; j < u.cols; j = j + 1u) {
        sum = sum + arena[u.a_off + i * u.cols + j];
    }
    arena[u.out_off + i] = arena[u.out_off + i] + sum;
}

@compute @workgroup_size(64)
fn mse_grad(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    arena[u.out_off + idx] = 2.0 * (arena[u.a_off + idx] - arena[u.b_off + idx]) / f32(u.count);
}

// out: params, a: grads, b: first moment, c: second moment
@compute @workgroup_size(64)
fn adam_step(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let idx = thread_index(gid, groups);
    if (idx >= u.count) {
        return;
    }
    let g = arena[u.a_off + idx];
    let m = u.beta1 * arena[u.b_off + idx] + (1.0 - u.beta1) * g;
    let v = u.beta2 * arena[u.c_off + idx] + (1.0 - u.beta2) * g * g;
    arena[u.b_off + idx] = m;
    arena[u.c_off + idx] = v;
    let m_hat = m / u.correction1;
    let v_hat = v / u.correction2;
    arena[u.out_off + idx] = arena[u.out_off + idx] - u.lr * m_hat / (sqrt(v_hat) + u.epsilon);
}
"#;
