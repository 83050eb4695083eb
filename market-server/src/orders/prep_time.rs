//! 备餐时间估算
//!
//! Advisory ETA fed into accept/start-preparing; staff overrides always win.

/// Inputs for one estimate
#[derive(Debug, Clone, Copy)]
pub struct PrepTimeInput {
    /// Shop's configured floor
    pub base_minutes: i64,
    pub busy_mode: bool,
    pub busy_extra_minutes: i64,
    /// Orders currently ACCEPTED or PREPARING at the shop
    pub active_order_count: i64,
    /// Item count of the order being estimated
    pub item_count: i64,
}

/// Hard ceiling; beyond this the estimate stops being useful
pub const MAX_PREP_MINUTES: i64 = 120;

/// `base + busy_extra + 3 per active order + 2 per started block of 5 items
/// past the first 3`, capped at [`MAX_PREP_MINUTES`].
pub fn estimate_minutes(input: &PrepTimeInput) -> i64 {
    let busy = if input.busy_mode {
        input.busy_extra_minutes
    } else {
        0
    };
    let queue = 3 * input.active_order_count.max(0);
    let extra_items = (input.item_count - 3).max(0);
    let size = 2 * ((extra_items + 4) / 5);

    (input.base_minutes + busy + queue + size).min(MAX_PREP_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PrepTimeInput {
        PrepTimeInput {
            base_minutes: 10,
            busy_mode: false,
            busy_extra_minutes: 15,
            active_order_count: 0,
            item_count: 1,
        }
    }

    #[test]
    fn test_quiet_small_order_is_base() {
        assert_eq!(estimate_minutes(&input()), 10);
    }

    #[test]
    fn test_busy_mode_adds_extra() {
        let i = PrepTimeInput {
            busy_mode: true,
            ..input()
        };
        assert_eq!(estimate_minutes(&i), 25);
    }

    #[test]
    fn test_queue_depth_scales() {
        let i = PrepTimeInput {
            active_order_count: 4,
            ..input()
        };
        assert_eq!(estimate_minutes(&i), 22);
    }

    #[test]
    fn test_item_count_blocks() {
        // 3 items: no surcharge
        assert_eq!(
            estimate_minutes(&PrepTimeInput { item_count: 3, ..input() }),
            10
        );
        // 4 items: one started block
        assert_eq!(
            estimate_minutes(&PrepTimeInput { item_count: 4, ..input() }),
            12
        );
        // 8 items: 5 extra -> still one block
        assert_eq!(
            estimate_minutes(&PrepTimeInput { item_count: 8, ..input() }),
            12
        );
        // 9 items: 6 extra -> two blocks
        assert_eq!(
            estimate_minutes(&PrepTimeInput { item_count: 9, ..input() }),
            14
        );
    }

    #[test]
    fn test_cap_at_two_hours() {
        let i = PrepTimeInput {
            base_minutes: 30,
            busy_mode: true,
            busy_extra_minutes: 30,
            active_order_count: 50,
            item_count: 40,
        };
        assert_eq!(estimate_minutes(&i), MAX_PREP_MINUTES);
    }
}
