use std::collections::HashSet;

use rand::seq::IndexedRandom;

// Pure winner selection. Forced ids come first, in the order given;
// the rest is drawn uniformly without replacement from the remaining
// participants. Forced winners are a floor, not a cap: when more ids
// are forced than requested, all of them are still returned.
pub fn select_winners(
    participants: &HashSet<String>,
    forced: &[String],
    count: usize,
) -> Vec<String> {
    let mut winners: Vec<String> = forced.to_vec();
    if winners.len() >= count {
        return winners;
    }

    let forced_set: HashSet<&String> = forced.iter().collect();
    let pool: Vec<&String> = participants
        .iter()
        .filter(|id| !forced_set.contains(*id))
        .collect();
    let draw = (count - winners.len()).min(pool.len());

    let mut rng = rand::rng();
    winners.extend(
        pool.choose_multiple(&mut rng, draw)
            .map(|id| (*id).clone()),
    );
    winners
}
