use crate::params::SarimaxParams;
use crate::types::{LagSpec, SarimaxOrder};
use nalgebra::{ComplexField, DMatrix};
use num_complex::Complex64;

/// Polynomial multiplication (convolution): c[k] = sum_i a[i]*b[k-i].
pub fn polymul<T: ComplexField + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    if a.is_empty() || b.is_empty() {
        return vec![];
    }
    let mut r = vec![T::zero(); a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            r[i + j] += ai * bj;
        }
    }
    r
}

/// Scatter free coefficients onto the full lag grid `1..=max_lag`; excluded
/// lags get zero. Coefficients correspond to the included lags in ascending
/// order.
pub fn expand_lags<T: ComplexField + Copy>(coeffs: &[T], spec: &LagSpec) -> Vec<T> {
    let mask = spec.inclusion();
    let mut full = vec![T::zero(); mask.len()];
    let mut it = coeffs.iter();
    for (slot, &included) in full.iter_mut().zip(mask.iter()) {
        if included {
            if let Some(&c) = it.next() {
                *slot = c;
            }
        }
    }
    full
}

/// AR polynomial: 1 - phi_1*L - phi_2*L^2 - ...
/// `coeffs` is the full lag vector (zeros at excluded lags).
pub fn make_ar_poly<T: ComplexField + Copy>(coeffs: &[T]) -> Vec<T> {
    let mut p = vec![T::zero(); coeffs.len() + 1];
    p[0] = T::one();
    for (i, &c) in coeffs.iter().enumerate() {
        p[i + 1] = -c;
    }
    p
}

/// Seasonal AR polynomial: 1 - Phi_1*L^s - Phi_2*L^(2s) - ...
pub fn make_seasonal_ar_poly<T: ComplexField + Copy>(coeffs: &[T], s: usize) -> Vec<T> {
    if coeffs.is_empty() {
        return vec![T::one()];
    }
    let mut p = vec![T::zero(); coeffs.len() * s + 1];
    p[0] = T::one();
    for (i, &c) in coeffs.iter().enumerate() {
        p[(i + 1) * s] = -c;
    }
    p
}

/// MA polynomial: 1 + theta_1*L + theta_2*L^2 + ...
pub fn make_ma_poly<T: ComplexField + Copy>(coeffs: &[T]) -> Vec<T> {
    let mut p = vec![T::zero(); coeffs.len() + 1];
    p[0] = T::one();
    for (i, &c) in coeffs.iter().enumerate() {
        p[i + 1] = c;
    }
    p
}

/// Seasonal MA polynomial: 1 + Theta_1*L^s + Theta_2*L^(2s) + ...
pub fn make_seasonal_ma_poly<T: ComplexField + Copy>(coeffs: &[T], s: usize) -> Vec<T> {
    if coeffs.is_empty() {
        return vec![T::one()];
    }
    let mut p = vec![T::zero(); coeffs.len() * s + 1];
    p[0] = T::one();
    for (i, &c) in coeffs.iter().enumerate() {
        p[(i + 1) * s] = c;
    }
    p
}

/// Reduced (expanded) AR polynomial = polymul(non-seasonal AR, seasonal AR).
pub fn reduced_ar<T: ComplexField + Copy>(
    params: &SarimaxParams<T>,
    order: &SarimaxOrder,
) -> Vec<T> {
    polymul(
        &make_ar_poly(&expand_lags(&params.ar_coeffs, &order.ar)),
        &make_seasonal_ar_poly(&expand_lags(&params.sar_coeffs, &order.seasonal_ar), order.s),
    )
}

/// Reduced (expanded) MA polynomial = polymul(non-seasonal MA, seasonal MA).
pub fn reduced_ma<T: ComplexField + Copy>(
    params: &SarimaxParams<T>,
    order: &SarimaxOrder,
) -> Vec<T> {
    polymul(
        &make_ma_poly(&expand_lags(&params.ma_coeffs, &order.ma)),
        &make_seasonal_ma_poly(&expand_lags(&params.sma_coeffs, &order.seasonal_ma), order.s),
    )
}

/// Roots of `c_0 + c_1 z + ... + c_p z^p` via the eigenvalues of the
/// companion matrix of the monic polynomial. Trailing zero coefficients are
/// dropped first; a constant polynomial has no roots.
pub fn polynomial_roots(poly: &[f64]) -> Vec<Complex64> {
    let mut coeffs = poly.to_vec();
    while coeffs.last().is_some_and(|c| c.abs() < 1e-14) {
        coeffs.pop();
    }
    let p = coeffs.len().saturating_sub(1);
    if p == 0 {
        return vec![];
    }
    let lead = coeffs[p];
    let mut companion = DMatrix::zeros(p, p);
    for i in 1..p {
        companion[(i, i - 1)] = 1.0;
    }
    for i in 0..p {
        companion[(i, p - 1)] = -coeffs[i] / lead;
    }
    companion.complex_eigenvalues().iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
