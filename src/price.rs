use rand::Rng;

/// Perturbs `old_price` by a relative change in `[-volatility, volatility)`
/// derived from a single uniform draw `r` in `[0, 1)`.
///
/// The draw is doubled onto `[0, 2v)` and anything above `v` is folded back by
/// `2v`. The fold and the `old + old * change` ordering are kept as-is so the
/// float results match previously generated streams bit for bit.
pub fn evolve_with_draw(old_price: f64, volatility: f64, r: f64) -> f64 {
    let mut change = 2.0 * volatility * r;
    if change > volatility {
        change -= 2.0 * volatility;
    }
    old_price + old_price * change
}

/// Draws one uniform sample from `rng` and applies [`evolve_with_draw`].
pub fn evolve<R: Rng + ?Sized>(rng: &mut R, old_price: f64, volatility: f64) -> f64 {
    let r: f64 = rng.gen();
    evolve_with_draw(old_price, volatility, r)
}
