use crate::types::{
    DecodedEvent, EventMeta, LiquidityKind, Protocol, RawLog, SwapEvent, TrackedPool,
    TransferEvent, V2LiquidityEvent, V3LiquidityEvent,
};
use alloy::primitives::{b256, Address, B256, U256};
use thiserror::Error;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
/// keccak256("Swap(address,uint256,uint256,uint256,uint256,address)")
pub const V2_SWAP_TOPIC: B256 =
    b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822");
/// keccak256("Mint(address,address,int24,int24,uint128,uint256,uint256)")
pub const V3_MINT_TOPIC: B256 =
    b256!("7a53080ba414158be7ec69b987b5fb7d07dee101fe85488f0853ae16239d0bde");
/// keccak256("Burn(address,int24,int24,uint128,uint256,uint256)")
pub const V3_BURN_TOPIC: B256 =
    b256!("0c396cd989a39f4459b5fa1aed6a9a8dcdbc45908acfd67e028cd568da98982c");

const WORD: usize = 32;

/// A decode failure is local to one log. The driver skips the log and keeps
/// the rest of the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} topics, log has {got}")]
    MalformedTopics { expected: usize, got: usize },
    #[error("log data length {0} is not a whole number of 32-byte words")]
    MalformedData(usize),
    #[error("unsupported event shape: {0}")]
    UnsupportedEventShape(&'static str),
}

fn topic_address(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

/// int24 stored in the low 3 bytes of a topic, two's-complement above 2^23.
fn topic_tick(topic: &B256) -> i32 {
    let raw = (u32::from(topic[29]) << 16) | (u32::from(topic[30]) << 8) | u32::from(topic[31]);
    if raw > 0x7F_FFFF {
        raw as i32 - 0x100_0000
    } else {
        raw as i32
    }
}

fn word_at(data: &[u8], index: usize) -> U256 {
    U256::from_be_slice(&data[index * WORD..(index + 1) * WORD])
}

fn check_data_words(log: &RawLog, min_words: usize) -> Result<usize, DecodeError> {
    if log.data.is_empty() || log.data.len() % WORD != 0 {
        return Err(DecodeError::MalformedData(log.data.len()));
    }
    let words = log.data.len() / WORD;
    if words < min_words {
        return Err(DecodeError::MalformedData(log.data.len()));
    }
    Ok(words)
}

/// Decode an ERC-20 Transfer: `topics = [sig, from, to]`, `data = amount`.
pub fn decode_transfer(log: &RawLog) -> Result<TransferEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::MalformedTopics {
            expected: 3,
            got: log.topics.len(),
        });
    }
    check_data_words(log, 1)?;
    Ok(TransferEvent {
        token: log.address,
        from: topic_address(&log.topics[1]),
        to: topic_address(&log.topics[2]),
        amount: word_at(&log.data, 0),
        meta: EventMeta::of(log),
    })
}

/// Decode a V2 Swap: data is four uint256 words in fixed order
/// (amount0In, amount1In, amount0Out, amount1Out).
pub fn decode_v2_swap(log: &RawLog) -> Result<SwapEvent, DecodeError> {
    check_data_words(log, 4)?;
    let sender = log.topics.get(1).map(topic_address).unwrap_or_default();
    let recipient = log.topics.get(2).map(topic_address).unwrap_or_default();
    Ok(SwapEvent {
        pool: log.address,
        sender,
        recipient,
        amount0_in: word_at(&log.data, 0),
        amount1_in: word_at(&log.data, 1),
        amount0_out: word_at(&log.data, 2),
        amount1_out: word_at(&log.data, 3),
        meta: EventMeta::of(log),
    })
}

/// Classify a Transfer on the pool's LP token contract as a fungible
/// liquidity change: minted from the zero address, burned to it, or a plain
/// wallet-to-wallet share transfer.
pub fn decode_v2_liquidity(log: &RawLog) -> Result<V2LiquidityEvent, DecodeError> {
    let transfer = decode_transfer(log)?;
    let kind = match (transfer.from == Address::ZERO, transfer.to == Address::ZERO) {
        (true, true) => {
            return Err(DecodeError::UnsupportedEventShape(
                "LP transfer from zero address to zero address",
            ));
        }
        (true, false) => LiquidityKind::Mint,
        (false, true) => LiquidityKind::Burn,
        (false, false) => LiquidityKind::PlainTransfer,
    };
    Ok(V2LiquidityEvent {
        pool: log.address,
        kind,
        from: transfer.from,
        to: transfer.to,
        lp_amount: transfer.amount,
        meta: transfer.meta,
    })
}

/// Decode a concentrated-liquidity Mint or Burn. Owner and the tick bounds
/// are indexed; Mint data leads with the sender word, which is discarded.
pub fn decode_v3_liquidity(
    log: &RawLog,
    kind: LiquidityKind,
) -> Result<V3LiquidityEvent, DecodeError> {
    if matches!(kind, LiquidityKind::PlainTransfer) {
        return Err(DecodeError::UnsupportedEventShape(
            "plain transfer is not a concentrated-liquidity change",
        ));
    }
    if log.topics.len() < 4 {
        return Err(DecodeError::MalformedTopics {
            expected: 4,
            got: log.topics.len(),
        });
    }
    // Mint data leads with the sender word; Burn has none. The layout is
    // fixed per kind, so a word count that disagrees with the kind is
    // malformed rather than read at a shifted offset.
    let expected_words = match kind {
        LiquidityKind::Mint => 4,
        LiquidityKind::Burn => 3,
        LiquidityKind::PlainTransfer => unreachable!(),
    };
    let words = check_data_words(log, expected_words)?;
    if words != expected_words {
        return Err(DecodeError::MalformedData(log.data.len()));
    }
    let first = expected_words - 3;
    Ok(V3LiquidityEvent {
        pool: log.address,
        kind,
        owner: topic_address(&log.topics[1]),
        tick_lower: topic_tick(&log.topics[2]),
        tick_upper: topic_tick(&log.topics[3]),
        liquidity: word_at(&log.data, first),
        amount0: word_at(&log.data, first + 1),
        amount1: word_at(&log.data, first + 2),
        meta: EventMeta::of(log),
    })
}

/// Dispatch a raw log by signature topic. `None` means the signature is not
/// one this pool tracks; that is not an error. A Transfer emitted by the
/// pool's own LP token contract is a fungible liquidity change, a Transfer
/// emitted by a tracked token is a holder balance movement.
pub fn decode_log(
    pool: &TrackedPool,
    log: &RawLog,
) -> Option<Result<DecodedEvent, DecodeError>> {
    let topic0 = *log.topics.first()?;
    if topic0 == TRANSFER_TOPIC {
        if pool.protocol == Protocol::UniswapV2 && log.address == pool.lp_token_address() {
            Some(decode_v2_liquidity(log).map(DecodedEvent::V2Liquidity))
        } else {
            Some(decode_transfer(log).map(DecodedEvent::Transfer))
        }
    } else if topic0 == V2_SWAP_TOPIC
        && pool.protocol == Protocol::UniswapV2
        && log.address == pool.address
    {
        Some(decode_v2_swap(log).map(DecodedEvent::Swap))
    } else if topic0 == V3_MINT_TOPIC
        && pool.protocol == Protocol::UniswapV3
        && log.address == pool.address
    {
        Some(decode_v3_liquidity(log, LiquidityKind::Mint).map(DecodedEvent::V3Liquidity))
    } else if topic0 == V3_BURN_TOPIC
        && pool.protocol == Protocol::UniswapV3
        && log.address == pool.address
    {
        Some(decode_v3_liquidity(log, LiquidityKind::Burn).map(DecodedEvent::V3Liquidity))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn addr_topic(addr: Address) -> B256 {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(addr.as_slice());
        B256::from(out)
    }

    fn tick_topic(raw: u32) -> B256 {
        let mut out = [0u8; 32];
        out[29] = (raw >> 16) as u8;
        out[30] = (raw >> 8) as u8;
        out[31] = raw as u8;
        B256::from(out)
    }

    fn amount_word(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    fn raw_log(contract: Address, topics: Vec<B256>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: contract,
            topics,
            data,
            block_number: 1_000,
            tx_hash: B256::repeat_byte(0xab),
            log_index: 7,
            block_timestamp: 1_700_000_000,
        }
    }

    fn token() -> Address {
        address!("1111111111111111111111111111111111111111")
    }

    fn holder_a() -> Address {
        address!("00000000000000000000000000000000000000aa")
    }

    fn holder_b() -> Address {
        address!("00000000000000000000000000000000000000bb")
    }

    fn transfer_log(from: Address, to: Address, amount: u64) -> RawLog {
        raw_log(
            token(),
            vec![TRANSFER_TOPIC, addr_topic(from), addr_topic(to)],
            amount_word(amount).to_vec(),
        )
    }

    #[test]
    fn transfer_decodes_deterministically() {
        let log = transfer_log(holder_a(), holder_b(), 500);
        let first = decode_transfer(&log).unwrap();
        let second = decode_transfer(&log).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.from, holder_a());
        assert_eq!(first.to, holder_b());
        assert_eq!(first.amount, U256::from(500));
    }

    #[test]
    fn transfer_rejects_missing_topics() {
        let log = raw_log(
            token(),
            vec![TRANSFER_TOPIC, addr_topic(holder_a())],
            amount_word(1).to_vec(),
        );
        assert_eq!(
            decode_transfer(&log),
            Err(DecodeError::MalformedTopics { expected: 3, got: 2 })
        );
    }

    #[test]
    fn transfer_rejects_ragged_data() {
        let mut log = transfer_log(holder_a(), holder_b(), 1);
        log.data.truncate(31);
        assert_eq!(decode_transfer(&log), Err(DecodeError::MalformedData(31)));
    }

    #[test]
    fn v2_swap_extracts_all_four_amounts() {
        let mut data = Vec::new();
        for amount in [0u64, 70_000, 1, 0] {
            data.extend_from_slice(&amount_word(amount));
        }
        let log = raw_log(
            token(),
            vec![V2_SWAP_TOPIC, addr_topic(holder_a()), addr_topic(holder_b())],
            data,
        );
        let swap = decode_v2_swap(&log).unwrap();
        assert_eq!(swap.amount0_in, U256::ZERO);
        assert_eq!(swap.amount1_in, U256::from(70_000));
        assert_eq!(swap.amount0_out, U256::from(1));
        assert_eq!(swap.amount1_out, U256::ZERO);
        assert_eq!(swap.recipient, holder_b());
    }

    #[test]
    fn v2_swap_rejects_short_data() {
        let log = raw_log(token(), vec![V2_SWAP_TOPIC], amount_word(1).to_vec());
        assert_eq!(decode_v2_swap(&log), Err(DecodeError::MalformedData(32)));
    }

    #[test]
    fn lp_transfer_classification() {
        let mint = decode_v2_liquidity(&transfer_log(Address::ZERO, holder_a(), 10)).unwrap();
        assert_eq!(mint.kind, LiquidityKind::Mint);

        let burn = decode_v2_liquidity(&transfer_log(holder_a(), Address::ZERO, 10)).unwrap();
        assert_eq!(burn.kind, LiquidityKind::Burn);

        let plain = decode_v2_liquidity(&transfer_log(holder_a(), holder_b(), 10)).unwrap();
        assert_eq!(plain.kind, LiquidityKind::PlainTransfer);

        let invalid = decode_v2_liquidity(&transfer_log(Address::ZERO, Address::ZERO, 10));
        assert!(matches!(
            invalid,
            Err(DecodeError::UnsupportedEventShape(_))
        ));
    }

    #[test]
    fn tick_sign_extension() {
        assert_eq!(topic_tick(&tick_topic(0xFF_FFFE)), -2);
        assert_eq!(topic_tick(&tick_topic(0x00_0005)), 5);
        assert_eq!(topic_tick(&tick_topic(0x80_0000)), -0x80_0000);
        assert_eq!(topic_tick(&tick_topic(0x7F_FFFF)), 0x7F_FFFF);
    }

    #[test]
    fn v3_mint_skips_leading_sender_word() {
        let mut data = Vec::new();
        data.extend_from_slice(&addr_topic(holder_b()).0); // sender, discarded
        for amount in [9_000u64, 100, 200] {
            data.extend_from_slice(&amount_word(amount));
        }
        let log = raw_log(
            token(),
            vec![
                V3_MINT_TOPIC,
                addr_topic(holder_a()),
                tick_topic(0xFF_FFFE),
                tick_topic(0x00_0005),
            ],
            data,
        );
        let event = decode_v3_liquidity(&log, LiquidityKind::Mint).unwrap();
        assert_eq!(event.owner, holder_a());
        assert_eq!(event.tick_lower, -2);
        assert_eq!(event.tick_upper, 5);
        assert_eq!(event.liquidity, U256::from(9_000));
        assert_eq!(event.amount0, U256::from(100));
        assert_eq!(event.amount1, U256::from(200));
    }

    #[test]
    fn v3_burn_reads_liquidity_from_first_word() {
        let mut data = Vec::new();
        for amount in [4_000u64, 40, 50] {
            data.extend_from_slice(&amount_word(amount));
        }
        let log = raw_log(
            token(),
            vec![
                V3_BURN_TOPIC,
                addr_topic(holder_a()),
                tick_topic(0x00_0001),
                tick_topic(0x00_0002),
            ],
            data,
        );
        let event = decode_v3_liquidity(&log, LiquidityKind::Burn).unwrap();
        assert_eq!(event.liquidity, U256::from(4_000));
        assert_eq!(event.amount0, U256::from(40));
        assert_eq!(event.amount1, U256::from(50));
    }

    #[test]
    fn v3_mint_with_burn_shaped_data_is_malformed() {
        // Only three words: the sender word a Mint must carry is missing.
        // Reading it anyway would return the sender reinterpreted as
        // liquidity, so this has to fail rather than shift the offsets.
        let mut data = Vec::new();
        for amount in [9_000u64, 100, 200] {
            data.extend_from_slice(&amount_word(amount));
        }
        let log = raw_log(
            token(),
            vec![
                V3_MINT_TOPIC,
                addr_topic(holder_a()),
                tick_topic(0x00_0001),
                tick_topic(0x00_0002),
            ],
            data,
        );
        assert_eq!(
            decode_v3_liquidity(&log, LiquidityKind::Mint),
            Err(DecodeError::MalformedData(96))
        );
    }

    #[test]
    fn v3_burn_with_mint_shaped_data_is_malformed() {
        let mut data = Vec::new();
        data.extend_from_slice(&addr_topic(holder_b()).0);
        for amount in [4_000u64, 40, 50] {
            data.extend_from_slice(&amount_word(amount));
        }
        let log = raw_log(
            token(),
            vec![
                V3_BURN_TOPIC,
                addr_topic(holder_a()),
                tick_topic(0x00_0001),
                tick_topic(0x00_0002),
            ],
            data,
        );
        assert_eq!(
            decode_v3_liquidity(&log, LiquidityKind::Burn),
            Err(DecodeError::MalformedData(128))
        );
    }

    #[test]
    fn v3_rejects_missing_tick_topics() {
        let log = raw_log(
            token(),
            vec![V3_BURN_TOPIC, addr_topic(holder_a())],
            amount_word(1).repeat(3),
        );
        assert_eq!(
            decode_v3_liquidity(&log, LiquidityKind::Burn),
            Err(DecodeError::MalformedTopics { expected: 4, got: 2 })
        );
    }

    #[test]
    fn dispatch_routes_lp_transfers_separately() {
        let pool = TrackedPool {
            address: token(),
            protocol: Protocol::UniswapV2,
            token0: crate::types::TokenInfo {
                address: address!("2222222222222222222222222222222222222222"),
                symbol: "WETH".into(),
                decimals: 18,
            },
            token1: crate::types::TokenInfo {
                address: address!("3333333333333333333333333333333333333333"),
                symbol: "USDT".into(),
                decimals: 6,
            },
            lp_token: None,
        };

        // Transfer on the pair contract itself: LP share movement.
        let lp_log = transfer_log(Address::ZERO, holder_a(), 10);
        let decoded = decode_log(&pool, &lp_log).unwrap().unwrap();
        assert!(matches!(decoded, DecodedEvent::V2Liquidity(_)));

        // Same signature on the tracked token: plain balance movement.
        let mut token_log = transfer_log(holder_a(), holder_b(), 10);
        token_log.address = pool.token0.address;
        let decoded = decode_log(&pool, &token_log).unwrap().unwrap();
        assert!(matches!(decoded, DecodedEvent::Transfer(_)));

        // Unknown signature is not routed and not an error.
        let mut unknown = transfer_log(holder_a(), holder_b(), 10);
        unknown.topics[0] = B256::repeat_byte(0x99);
        assert!(decode_log(&pool, &unknown).is_none());
    }
}
