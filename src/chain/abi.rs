//! Contract bindings used by the gateway

use alloy::sol;

sol! {
    /// ERC20 surface plus the optional fee getters some tax tokens expose
    #[sol(rpc)]
    interface IERC20 {
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 value) external returns (bool success);

        function feeBasisPoints() external view returns (uint256);
        function feePercentTimes100() external view returns (uint256);
        function feeReceiver() external view returns (address);
    }

    /// Quoting side of a UniswapV2-style router
    #[sol(rpc)]
    interface IRouterQuoter {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
    }

    /// Swap entry points shared by the router and the fee wrapper
    interface ISwapExecutor {
        function swapExactETHForTokensSupportingFeeOnTransferTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable;

        function swapExactTokensForETHSupportingFeeOnTransferTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external;
    }
}
