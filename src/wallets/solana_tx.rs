//! Minimal Solana legacy transaction encoding
//!
//! Covers exactly what the adapter submits: system transfers, associated
//! token account creation and SPL `TransferChecked`, signed by a single fee
//! payer.

use super::{SigningSecret, WalletError, WalletResult};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

pub type Pubkey = [u8; 32];

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

pub fn decode_pubkey(address: &str) -> WalletResult<Pubkey> {
    let bytes = bs58::decode(address.trim())
        .into_vec()
        .map_err(|e| {
            WalletError::Validation(format!("Invalid Solana address {}: {}", address, e))
        })?;
    bytes
        .try_into()
        .map_err(|_| WalletError::Validation(format!("Solana address {} is not 32 bytes", address)))
}

pub fn encode_pubkey(key: &Pubkey) -> String {
    bs58::encode(key).into_string()
}

/// Parse a base58 secret: a 32-byte seed or a 64-byte seed ‖ pubkey keypair
pub fn signing_key(secret: &SigningSecret) -> WalletResult<SigningKey> {
    let bytes = bs58::decode(secret.expose())
        .into_vec()
        .map_err(|_| {
            WalletError::Validation("Solana private key is not valid base58".to_string())
        })?;

    match bytes.len() {
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let mut keypair = [0u8; 64];
            keypair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&keypair).map_err(|_| {
                WalletError::Validation("Solana keypair public half does not match".to_string())
            })
        }
        n => Err(WalletError::Validation(format!(
            "Solana private key must be 32 or 64 bytes, got {}",
            n
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: true }
    }

    fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

fn program(id: &str) -> WalletResult<Pubkey> {
    decode_pubkey(id).map_err(|e| WalletError::Internal(e.to_string()))
}

/// System program `Transfer`
pub fn system_transfer(from: Pubkey, to: Pubkey, lamports: u64) -> WalletResult<Instruction> {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Ok(Instruction {
        program_id: program(SYSTEM_PROGRAM_ID)?,
        accounts: vec![AccountMeta::writable(from, true), AccountMeta::writable(to, false)],
        data,
    })
}

/// Associated token program `Create`
pub fn create_associated_token_account(
    payer: Pubkey,
    owner: Pubkey,
    mint: Pubkey,
) -> WalletResult<Instruction> {
    let account = associated_token_address(&owner, &mint)?;

    Ok(Instruction {
        program_id: program(ASSOCIATED_TOKEN_PROGRAM_ID)?,
        accounts: vec![
            AccountMeta::writable(payer, true),
            AccountMeta::writable(account, false),
            AccountMeta::readonly(owner, false),
            AccountMeta::readonly(mint, false),
            AccountMeta::readonly(program(SYSTEM_PROGRAM_ID)?, false),
            AccountMeta::readonly(program(TOKEN_PROGRAM_ID)?, false),
        ],
        data: vec![0],
    })
}

/// SPL token `TransferChecked`
pub fn transfer_checked(
    source: Pubkey,
    mint: Pubkey,
    destination: Pubkey,
    owner: Pubkey,
    amount: u64,
    decimals: u8,
) -> WalletResult<Instruction> {
    let mut data = Vec::with_capacity(10);
    data.push(12);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);

    Ok(Instruction {
        program_id: program(TOKEN_PROGRAM_ID)?,
        accounts: vec![
            AccountMeta::writable(source, false),
            AccountMeta::readonly(mint, false),
            AccountMeta::writable(destination, false),
            AccountMeta::readonly(owner, true),
        ],
        data,
    })
}

/// Off-curve address derived from `seeds`, searching bumps from 255 down
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
    (0..=u8::MAX).rev().find_map(|bump| {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id);
        hasher.update(PDA_MARKER);
        let candidate: Pubkey = hasher.finalize().into();

        // A valid program address must not be an ed25519 point
        if VerifyingKey::from_bytes(&candidate).is_ok() {
            None
        } else {
            Some((candidate, bump))
        }
    })
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> WalletResult<Pubkey> {
    let token_program = program(TOKEN_PROGRAM_ID)?;
    let ata_program = program(ASSOCIATED_TOKEN_PROGRAM_ID)?;

    find_program_address(&[&owner[..], &token_program[..], &mint[..]], &ata_program)
        .map(|(address, _)| address)
        .ok_or_else(|| WalletError::Internal("No viable associated token address".to_string()))
}

/// Solana's compact-u16 length prefix
fn encode_length(out: &mut Vec<u8>, len: usize) -> WalletResult<()> {
    let mut rem = u16::try_from(len)
        .map_err(|_| WalletError::Internal(format!("length {} overflows compact-u16", len)))?;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return Ok(());
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Serialize a legacy message with `payer` as the only signer
pub fn compile_message(
    payer: &Pubkey,
    instructions: &[Instruction],
    recent_blockhash: &Pubkey,
) -> WalletResult<Vec<u8>> {
    let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(*payer, true)];
    let mut merge = |meta: AccountMeta| match metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
        Some(existing) => {
            existing.is_signer |= meta.is_signer;
            existing.is_writable |= meta.is_writable;
        }
        None => metas.push(meta),
    };
    for ix in instructions {
        for meta in &ix.accounts {
            merge(meta.clone());
        }
        merge(AccountMeta::readonly(ix.program_id, false));
    }

    if metas.iter().filter(|m| m.is_signer).count() != 1 {
        return Err(WalletError::Internal(
            "Only single-signer messages are supported".to_string(),
        ));
    }

    // Stable sort keeps the payer first among writable signers
    metas.sort_by_key(|m| match (m.is_signer, m.is_writable) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let readonly_signed = metas.iter().filter(|m| m.is_signer && !m.is_writable).count();
    let readonly_unsigned = metas.iter().filter(|m| !m.is_signer && !m.is_writable).count();
    let index_of = |key: &Pubkey| -> WalletResult<u8> {
        let index = metas
            .iter()
            .position(|m| &m.pubkey == key)
            .ok_or_else(|| WalletError::Internal("Account missing from message".to_string()))?;
        u8::try_from(index).map_err(|_| WalletError::Internal("Too many accounts".to_string()))
    };

    let mut out = vec![1, readonly_signed as u8, readonly_unsigned as u8];
    encode_length(&mut out, metas.len())?;
    for meta in &metas {
        out.extend_from_slice(&meta.pubkey);
    }
    out.extend_from_slice(recent_blockhash);

    encode_length(&mut out, instructions.len())?;
    for ix in instructions {
        out.push(index_of(&ix.program_id)?);
        encode_length(&mut out, ix.accounts.len())?;
        for meta in &ix.accounts {
            out.push(index_of(&meta.pubkey)?);
        }
        encode_length(&mut out, ix.data.len())?;
        out.extend_from_slice(&ix.data);
    }

    Ok(out)
}

/// Sign and serialize. Returns the wire bytes and the base58 signature,
/// which doubles as the transaction id.
pub fn sign_transaction(
    key: &SigningKey,
    instructions: &[Instruction],
    recent_blockhash: &Pubkey,
) -> WalletResult<(Vec<u8>, String)> {
    let payer = key.verifying_key().to_bytes();
    let message = compile_message(&payer, instructions, recent_blockhash)?;
    let signature = key.sign(&message).to_bytes();

    let mut tx = Vec::with_capacity(1 + signature.len() + message.len());
    encode_length(&mut tx, 1)?;
    tx.extend_from_slice(&signature);
    tx.extend_from_slice(&message);

    Ok((tx, bs58::encode(signature).into_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    const OWNER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn compact_u16_lengths() {
        for (len, expected) in [
            (0usize, vec![0x00]),
            (0x7f, vec![0x7f]),
            (0x80, vec![0x80, 0x01]),
            (0x3fff, vec![0xff, 0x7f]),
            (0x4000, vec![0x80, 0x80, 0x01]),
        ] {
            let mut out = Vec::new();
            encode_length(&mut out, len).unwrap();
            assert_eq!(out, expected, "{len}");
        }
    }

    #[test]
    fn derives_associated_token_address() {
        let owner = decode_pubkey(OWNER).unwrap();
        let mint = decode_pubkey(USDC_MINT).unwrap();
        let ata = associated_token_address(&owner, &mint).unwrap();
        assert_eq!(encode_pubkey(&ata), "FGETo8T8wMcN2wCjav8VK6eh3dLk63evNDPxzLSJra8B");
    }

    #[test]
    fn parses_seed_and_keypair_secrets() {
        let key = test_key();
        let seed = SigningSecret::new(bs58::encode(key.to_bytes()).into_string());
        let pair = SigningSecret::new(bs58::encode(key.to_keypair_bytes()).into_string());

        assert_eq!(signing_key(&seed).unwrap().verifying_key(), key.verifying_key());
        assert_eq!(signing_key(&pair).unwrap().verifying_key(), key.verifying_key());

        let mut mismatched = key.to_keypair_bytes();
        mismatched[40] ^= 0xff;
        let bad = SigningSecret::new(bs58::encode(mismatched).into_string());
        assert!(signing_key(&bad).is_err());
        assert!(signing_key(&SigningSecret::new("0OIl")).is_err());
    }

    #[test]
    fn system_transfer_message_layout() {
        let key = test_key();
        let payer = key.verifying_key().to_bytes();
        let to = decode_pubkey(OWNER).unwrap();
        let blockhash = [9u8; 32];
        let ix = system_transfer(payer, to, 1_500_000_000).unwrap();

        let message = compile_message(&payer, &[ix], &blockhash).unwrap();
        // header: one signer, no readonly signers, the system program readonly
        assert_eq!(&message[..3], &[1, 0, 1]);
        assert_eq!(message[3], 3);
        assert_eq!(&message[4..36], &payer);
        assert_eq!(&message[36..68], &to);
        assert_eq!(&message[68..100], &[0u8; 32]);
        assert_eq!(&message[100..132], &blockhash);
        // one instruction: program 2, accounts [0, 1], 12 data bytes
        assert_eq!(&message[132..138], &[1, 2, 2, 0, 1, 12]);
        assert_eq!(&message[138..142], &[2, 0, 0, 0]);
        assert_eq!(&message[142..150], &1_500_000_000u64.to_le_bytes());
        assert_eq!(message.len(), 150);
    }

    #[test]
    fn transfer_checked_orders_accounts() {
        let key = test_key();
        let owner = key.verifying_key().to_bytes();
        let mint = decode_pubkey(USDC_MINT).unwrap();
        let source = associated_token_address(&owner, &mint).unwrap();
        let dest = associated_token_address(&decode_pubkey(OWNER).unwrap(), &mint).unwrap();
        let ix = transfer_checked(source, mint, dest, owner, 2_500_000, 6).unwrap();
        assert_eq!(ix.data[0], 12);
        assert_eq!(ix.data[9], 6);

        let message = compile_message(&owner, &[ix], &[1u8; 32]).unwrap();
        // owner signs, source and dest writable, mint and token program readonly
        assert_eq!(&message[..3], &[1, 0, 2]);
        assert_eq!(message[3], 5);
        assert_eq!(&message[4..36], &owner);
        assert_eq!(&message[36..68], &source);
        assert_eq!(&message[68..100], &dest);
    }

    #[test]
    fn signature_covers_the_message() {
        let key = test_key();
        let payer = key.verifying_key().to_bytes();
        let ix = system_transfer(payer, decode_pubkey(OWNER).unwrap(), 1).unwrap();
        let blockhash = [3u8; 32];

        let (tx, signature) = sign_transaction(&key, &[ix.clone()], &blockhash).unwrap();
        assert_eq!(tx[0], 1);

        let sig_bytes: [u8; 64] = tx[1..65].try_into().unwrap();
        assert_eq!(bs58::encode(sig_bytes).into_string(), signature);

        let message = compile_message(&payer, &[ix], &blockhash).unwrap();
        assert_eq!(&tx[65..], &message[..]);
        key.verifying_key()
            .verify(&message, &Signature::from_bytes(&sig_bytes))
            .unwrap();
    }
}
