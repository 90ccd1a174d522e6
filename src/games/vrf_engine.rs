use crate::games::{tables::PPM_TOTAL, types::VRFBundle};
use schnorrkel::{Keypair, PublicKey, Signature};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"void-collector-spin";

/// One verifiable random draw
#[derive(Debug, Clone)]
pub struct Draw {
    /// Uniform in `[0, 1_000_000)`
    pub ppm: u32,
    /// Independent value for sizing ranged rewards
    pub magnitude: u64,
    pub bundle: VRFBundle,
}

/// VRF-based draw source for spins
pub struct VrfDrawEngine {
    keypair: Arc<Keypair>,
}

impl VrfDrawEngine {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Random keypair, for tests and first start
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Restore from `Keypair::to_bytes` output
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, String> {
        Keypair::from_bytes(bytes)
            .map(Self::new)
            .map_err(|e| format!("Invalid VRF keypair: {:?}", e))
    }

    pub fn keypair_bytes(&self) -> Vec<u8> {
        self.keypair.to_bytes().to_vec()
    }

    /// Draw for `variant:transaction_ref:subject`
    pub fn draw(&self, variant: &str, transaction_ref: &str, subject: &str) -> Draw {
        let input_message = format!("{}:{}:{}", variant, transaction_ref, subject);
        let (output, proof) = self.vrf_sign(input_message.as_bytes());
        let (ppm, magnitude) = Self::split_output(&output);

        Draw {
            ppm,
            magnitude,
            bundle: VRFBundle {
                vrf_output: hex::encode(output),
                vrf_proof: hex::encode(proof),
                public_key: self.public_key_hex(),
                input_message,
            },
        }
    }

    /// Output is the hash of the signature; the signature is the proof
    fn vrf_sign(&self, message: &[u8]) -> (Vec<u8>, Vec<u8>) {
        use schnorrkel::context::SigningContext;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(message));

        let mut hasher = Sha256::new();
        hasher.update(signature.to_bytes());
        (hasher.finalize().to_vec(), signature.to_bytes().to_vec())
    }

    /// First 8 bytes pick the tier, next 8 size the reward
    pub fn split_output(output: &[u8]) -> (u32, u64) {
        let word = |range: std::ops::Range<usize>| {
            let mut bytes = [0u8; 8];
            if let Some(slice) = output.get(range) {
                bytes.copy_from_slice(slice);
            }
            u64::from_be_bytes(bytes)
        };
        ((word(0..8) % PPM_TOTAL as u64) as u32, word(8..16))
    }

    /// Check a bundle against the input it claims to cover
    pub fn verify_vrf_proof(bundle: &VRFBundle, expected_input: &str) -> Result<bool, String> {
        use schnorrkel::context::SigningContext;

        if bundle.input_message != expected_input {
            return Ok(false);
        }

        let output = hex::decode(&bundle.vrf_output).map_err(|e| format!("Invalid VRF output hex: {}", e))?;
        let proof = hex::decode(&bundle.vrf_proof).map_err(|e| format!("Invalid VRF proof hex: {}", e))?;
        let public_key_bytes =
            hex::decode(&bundle.public_key).map_err(|e| format!("Invalid public key hex: {}", e))?;

        let public_key =
            PublicKey::from_bytes(&public_key_bytes).map_err(|e| format!("Invalid public key: {:?}", e))?;
        let signature = Signature::from_bytes(&proof).map_err(|e| format!("Invalid signature: {:?}", e))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key.verify(ctx.bytes(expected_input.as_bytes()), &signature).is_err() {
            return Ok(false);
        }

        let mut hasher = Sha256::new();
        hasher.update(&proof);
        Ok(hasher.finalize().as_slice() == output.as_slice())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}
