/*!
 * Chains of unresolved forward jumps.
 *
 * Follows javac's Chain representation: a singly linked list of jump sites
 * kept in decreasing pc order so resolution walks each site once. A label's
 * pending references are one chain; merging chains keeps the order invariant.
 */

/// A linked list of unresolved forward jumps to one target.
#[derive(Debug, Clone)]
pub struct Chain {
    /// pc of the jump instruction (the opcode byte, not its offset field)
    pub pc: usize,
    /// Operand stack depth at the jump; all jumps resolving to one target
    /// must agree on it
    pub stacksize: u32,
    pub next: Option<Box<Chain>>,
}

impl Chain {
    pub fn new(pc: usize, stacksize: u32, next: Option<Box<Chain>>) -> Box<Chain> {
        Box::new(Chain { pc, stacksize, next })
    }

    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { current: Some(self) }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }
}

pub struct ChainIter<'a> {
    current: Option<&'a Chain>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let chain = self.current?;
        self.current = chain.next.as_deref();
        Some(chain.pc)
    }
}

/// Merge two chains preserving decreasing pc order (javac mergeChains).
pub fn merge(chain1: Option<Box<Chain>>, chain2: Option<Box<Chain>>) -> Option<Box<Chain>> {
    match (chain1, chain2) {
        (None, None) => None,
        (Some(c), None) | (None, Some(c)) => Some(c),
        (Some(c1), Some(c2)) => {
            if c1.pc >= c2.pc {
                Some(Chain::new(c1.pc, c1.stacksize, merge(c1.next, Some(c2))))
            } else {
                Some(Chain::new(c2.pc, c2.stacksize, merge(Some(c1), c2.next)))
            }
        }
    }
}
