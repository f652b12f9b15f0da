use crate::data::FloatData;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

/// Numerically stable log of the sum of exponentials of a slice.
///
/// Shifts by the maximum element so no intermediate exponential overflows.
#[inline]
pub fn log_sum_exp<T: FloatData<T>>(v: &[T]) -> T {
    let max = v.iter().copied().fold(T::MIN, |a, b| if b > a { b } else { a });
    if max == T::INFINITY {
        return T::INFINITY;
    }
    let sum: T = v.iter().map(|x| (*x - max).exp()).sum();
    max + sum.ln()
}

/// Write the softmax of `logits` into `out`. Both slices must have equal length.
#[inline]
pub fn softmax_into<T: FloatData<T>>(logits: &[T], out: &mut [T]) {
    let lse = log_sum_exp(logits);
    for (o, z) in out.iter_mut().zip(logits) {
        *o = (*z - lse).exp();
    }
}

/// Infinity norm of a slice.
#[inline]
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |a, x| a.max(x.abs()))
}

/// Dot product of two equal-length slices.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
