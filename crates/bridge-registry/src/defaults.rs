use bridge_types::{ChainEntry, NativeChainId, Network};

fn evm(network: Network, chain: &str, chain_id: u64, bridge_id: u16) -> ChainEntry {
	ChainEntry::new(network, chain, NativeChainId::Evm(chain_id)).with_bridge_chain_id(bridge_id)
}

fn solana(network: Network, cluster: &str) -> ChainEntry {
	ChainEntry::new(network, "Solana", NativeChainId::Solana(cluster.to_string()))
		.with_bridge_chain_id(1)
}

/// Built-in chain table.
pub fn default_entries() -> Vec<ChainEntry> {
	use Network::*;

	vec![
		solana(Mainnet, "mainnet-beta"),
		evm(Mainnet, "Ethereum", 1, 2),
		evm(Mainnet, "Bsc", 56, 4),
		evm(Mainnet, "Polygon", 137, 5),
		evm(Mainnet, "Avalanche", 43114, 6),
		evm(Mainnet, "Celo", 42220, 14),
		evm(Mainnet, "Arbitrum", 42161, 23),
		evm(Mainnet, "Optimism", 10, 24),
		evm(Mainnet, "Base", 8453, 30),
		solana(Testnet, "devnet"),
		evm(Testnet, "Bsc", 97, 4),
		evm(Testnet, "Polygon", 80002, 5),
		evm(Testnet, "Avalanche", 43113, 6),
		evm(Testnet, "Celo", 44787, 14),
		evm(Testnet, "Sepolia", 11155111, 10002),
		evm(Testnet, "ArbitrumSepolia", 421614, 10003),
		evm(Testnet, "BaseSepolia", 84532, 10004),
		evm(Testnet, "OptimismSepolia", 11155420, 10005),
		evm(Testnet, "Holesky", 17000, 10006),
		solana(Devnet, "localnet"),
		evm(Devnet, "Ethereum", 1337, 2),
		evm(Devnet, "Bsc", 1397, 4),
	]
}
