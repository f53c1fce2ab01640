/// Trapezoidal integral over a time series with non-decreasing
/// timestamps. Fewer than two samples integrate to zero. Evaluating a
/// prefix of a history is exactly a recomputation over that prefix; the
/// result carries proxy-seconds.
pub fn integrate<I>(samples: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut iter = samples.into_iter();
    let mut prev = match iter.next() {
        Some(first) => first,
        None => return 0.0,
    };
    let mut total = 0.0;
    for cur in iter {
        total += 0.5 * (prev.1 + cur.1) * (cur.0 - prev.0);
        prev = cur;
    }
    total
}
