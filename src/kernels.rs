//! Allocation-free numeric kernels over `(rows, cols)` row-major float spans.
//!
//! Activations are `(features, batch)` blocks, so for a layer with weights
//! `W: (out, in)` and input `X: (in, batch)`:
//!
//! | step | kernel |
//! |------|--------|
//! | `W · X` | [`matmul`] |
//! | `dW = G · Xᵀ` | [`matmul_transposed_right`] |
//! | `dX = Wᵀ · G` | [`matmul_transposed_left`] |
//!
//! The inner loops run over the contiguous batch axis with `wide::f32x8`.

use wide::f32x8;

/// Frequency of the sine activation, shared by forward and backward.
pub const SIREN_W0: f32 = 30.0;

const LANES: usize = 8;

#[inline]
fn load8(src: &[f32]) -> f32x8 {
    let mut arr = [0.0f32; LANES];
    arr.copy_from_slice(&src[..LANES]);
    f32x8::new(arr)
}

/// `y += alpha * x` over equal-length rows.
#[inline]
fn axpy(y: &mut [f32], alpha: f32, x: &[f32]) {
    debug_assert_eq!(y.len(), x.len());
    let alpha_v = f32x8::splat(alpha);
    let mut y_chunks = y.chunks_exact_mut(LANES);
    let mut x_chunks = x.chunks_exact(LANES);
    for (yc, xc) in (&mut y_chunks).zip(&mut x_chunks) {
        let out: [f32; LANES] = (load8(yc) + alpha_v * load8(xc)).into();
        yc.copy_from_slice(&out);
    }
    for (yv, &xv) in y_chunks
        .into_remainder()
        .iter_mut()
        .zip(x_chunks.remainder())
    {
        *yv += alpha * xv;
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = f32x8::splat(0.0);
    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let a_tail = a_chunks.remainder();
    let b_tail = b_chunks.remainder();
    for (ac, bc) in a_chunks.zip(b_chunks) {
        acc += load8(ac) * load8(bc);
    }
    let lanes: [f32; LANES] = acc.into();
    let mut sum: f32 = lanes.iter().sum();
    for (x, y) in a_tail.iter().zip(b_tail) {
        sum += x * y;
    }
    sum
}

/// `C = A · B` with `A: (a_rows, b_rows)`, `B: (b_rows, b_cols)`.
pub fn matmul(c: &mut [f32], a: &[f32], b: &[f32], a_rows: usize, b_rows: usize, b_cols: usize) {
    debug_assert!(c.len() >= a_rows * b_cols);
    debug_assert!(a.len() >= a_rows * b_rows);
    debug_assert!(b.len() >= b_rows * b_cols);
    for i in 0..a_rows {
        let c_row = &mut c[i * b_cols..(i + 1) * b_cols];
        c_row.fill(0.0);
        for k in 0..b_rows {
            axpy(c_row, a[i * b_rows + k], &b[k * b_cols..(k + 1) * b_cols]);
        }
    }
}

/// `C = A · Bᵀ` with `A: (a_rows, a_cols)`, `B: (b_rows, a_cols)`; `C: (a_rows, b_rows)`.
pub fn matmul_transposed_right(
    c: &mut [f32],
    a: &[f32],
    b: &[f32],
    a_rows: usize,
    a_cols: usize,
    b_rows: usize,
) {
    debug_assert!(c.len() >= a_rows * b_rows);
    for i in 0..a_rows {
        let a_row = &a[i * a_cols..(i + 1) * a_cols];
        for j in 0..b_rows {
            c[i * b_rows + j] = dot(a_row, &b[j * a_cols..(j + 1) * a_cols]);
        }
    }
}

/// `C = Aᵀ · B` with `A: (a_rows, a_cols)`, `B: (a_rows, b_cols)`; `C: (a_cols, b_cols)`.
pub fn matmul_transposed_left(
    c: &mut [f32],
    a: &[f32],
    b: &[f32],
    a_rows: usize,
    a_cols: usize,
    b_cols: usize,
) {
    debug_assert!(c.len() >= a_cols * b_cols);
    c[..a_cols * b_cols].fill(0.0);
    for k in 0..a_rows {
        let b_row = &b[k * b_cols..(k + 1) * b_cols];
        for i in 0..a_cols {
            axpy(&mut c[i * b_cols..(i + 1) * b_cols], a[k * a_cols + i], b_row);
        }
    }
}

/// `res[i, j] = inp[i, j] + bias[i]`.
pub fn add_bias(res: &mut [f32], inp: &[f32], bias: &[f32], n_rows: usize, n_cols: usize) {
    for i in 0..n_rows {
        let row = i * n_cols..(i + 1) * n_cols;
        let b = bias[i];
        for (r, &x) in res[row.clone()].iter_mut().zip(&inp[row]) {
            *r = x + b;
        }
    }
}

/// `res = sin(w0 * inp)` elementwise; lengths follow `res`.
pub fn sin_activation(res: &mut [f32], inp: &[f32]) {
    for (r, &x) in res.iter_mut().zip(inp) {
        *r = (SIREN_W0 * x).sin();
    }
}

/// `res = w0 * cos(w0 * inp) * out_grad`, with `inp` the pre-activation.
pub fn sin_grad(res: &mut [f32], inp: &[f32], out_grad: &[f32]) {
    for ((r, &x), &g) in res.iter_mut().zip(inp).zip(out_grad) {
        *r = SIREN_W0 * (SIREN_W0 * x).cos() * g;
    }
}

/// `res[i] += Σ_j inp[i, j]`. Accumulates; zero `res` first.
pub fn bias_grad(res: &mut [f32], inp: &[f32], n_rows: usize, n_cols: usize) {
    for (i, r) in res[..n_rows].iter_mut().enumerate() {
        *r += inp[i * n_cols..(i + 1) * n_cols].iter().sum::<f32>();
    }
}

/// `res[i] = 2 * (preds[i] - gt[i]) / n` with `n = res.len()`.
pub fn mse_grad(res: &mut [f32], preds: &[f32], gt: &[f32]) {
    let n = res.len() as f32;
    for ((r, &p), &g) in res.iter_mut().zip(preds).zip(gt) {
        *r = 2.0 * (p - g) / n;
    }
}
